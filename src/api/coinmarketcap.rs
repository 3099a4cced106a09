// ============================================================================
// API Client : CoinMarketCap
// ============================================================================
// Implémentation de QuoteProvider sur l'API "pro" de CoinMarketCap.
//
// Endpoints utilisés :
// - /v1/cryptocurrency/listings/latest : catalogue (1500 premiers coins)
// - /v1/cryptocurrency/info            : logos, par lots de 1000 ids
// - /v1/cryptocurrency/quotes/latest   : cotations groupées
//
// Le catalogue est chargé une seule fois par session (tokio OnceCell),
// au premier besoin.
// ============================================================================

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, instrument, warn};

use crate::api::provider::QuoteProvider;
use crate::api::build_http_client;
use crate::error::ProviderError;
use crate::models::{Quote, Symbol};

/// URL de base de l'API
pub const BASE_URL: &str = "https://pro-api.coinmarketcap.com";

/// En-tête portant la clé API
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// Nombre de coins chargés dans le catalogue
const LISTING_LIMIT: usize = 1500;

/// Taille des lots pour /info
const INFO_BATCH: usize = 1000;

// ============================================================================
// Structures pour parser les réponses JSON
// ============================================================================
// Toutes les réponses ont la forme { "status": {...}, "data": ... }
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: Status,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    error_code: i64,
    error_message: Option<String>,
}

/// Un coin du listing
#[derive(Debug, Deserialize)]
struct Listing {
    id: u64,
    name: String,
    symbol: String,
    /// Clés = devises disponibles ; le contenu ne nous intéresse pas ici
    #[serde(default)]
    quote: HashMap<String, serde_json::Value>,
}

/// Métadonnées d'un coin (/info)
#[derive(Debug, Deserialize)]
struct CoinInfo {
    logo: Option<String>,
}

/// Un coin de /quotes/latest
#[derive(Debug, Deserialize)]
struct MarketQuote {
    #[serde(default)]
    quote: HashMap<String, CurrencyQuote>,
}

/// Métriques dans une devise
#[derive(Debug, Deserialize)]
struct CurrencyQuote {
    price: Option<f64>,
    volume_24h: Option<f64>,
    volume_7d: Option<f64>,
    volume_30d: Option<f64>,
    market_cap: Option<f64>,
    percent_change_1h: Option<f64>,
    percent_change_24h: Option<f64>,
    percent_change_7d: Option<f64>,
    percent_change_30d: Option<f64>,
    last_updated: Option<DateTime<Utc>>,
}

// ============================================================================
// Catalogue
// ============================================================================

/// Catalogue chargé une fois par session
#[derive(Debug, Default)]
struct Catalog {
    symbols: Vec<Symbol>,
    /// ticker -> index dans symbols (premier coin listé pour un ticker donné)
    by_ticker: HashMap<String, usize>,
    currencies: Vec<String>,
}

impl Catalog {
    /// Construit le catalogue à partir du listing
    ///
    /// Les devises sont l'union triée des clés de cotation du listing.
    fn from_listings(listings: Vec<Listing>) -> Self {
        let mut currencies: Vec<String> = listings
            .iter()
            .flat_map(|l| l.quote.keys().cloned())
            .collect();
        currencies.sort();
        currencies.dedup();

        let mut by_ticker = HashMap::new();
        let symbols: Vec<Symbol> = listings
            .into_iter()
            .enumerate()
            .map(|(i, l)| {
                // Plusieurs coins partagent parfois un ticker : le listing est
                // trié par capitalisation, on garde le premier
                by_ticker.entry(l.symbol.clone()).or_insert(i);
                Symbol::new(l.id, l.symbol, l.name)
            })
            .collect();

        Self {
            symbols,
            by_ticker,
            currencies,
        }
    }

    /// Renseigne les URLs de logos à partir de /info (clé = id en texte)
    fn attach_icons(&mut self, infos: &HashMap<String, CoinInfo>) {
        for symbol in &mut self.symbols {
            if let Some(logo) = infos.get(&symbol.id.to_string()).and_then(|i| i.logo.clone()) {
                symbol.icon_url = Some(logo);
            }
        }
    }

    fn find(&self, ticker: &str) -> Option<&Symbol> {
        self.by_ticker.get(ticker).map(|&i| &self.symbols[i])
    }

    /// Convertit la réponse /quotes/latest en Quotes
    ///
    /// Résultat dans l'ordre des tickers demandés ; un ticker absent du
    /// catalogue ou sans cotation dans la devise est ignoré.
    fn convert_quotes(
        &self,
        mut markets: HashMap<String, MarketQuote>,
        currency: &str,
        tickers: &[String],
    ) -> Vec<Quote> {
        tickers
            .iter()
            .filter_map(|ticker| {
                let mut market = markets.remove(ticker)?;
                let metrics = market.quote.remove(currency)?;
                let symbol = match self.find(ticker) {
                    Some(symbol) => symbol.clone(),
                    None => {
                        debug!(ticker = %ticker, "Quote for symbol missing from catalog, dropped");
                        return None;
                    }
                };
                Some(to_quote(symbol, metrics))
            })
            .collect()
    }
}

fn to_quote(symbol: Symbol, q: CurrencyQuote) -> Quote {
    Quote {
        symbol,
        price: q.price.unwrap_or_default(),
        volume_24h: q.volume_24h.unwrap_or_default(),
        volume_7d: q.volume_7d.unwrap_or_default(),
        volume_30d: q.volume_30d.unwrap_or_default(),
        market_cap: q.market_cap.unwrap_or_default(),
        percent_change_1h: q.percent_change_1h.unwrap_or_default(),
        percent_change_24h: q.percent_change_24h.unwrap_or_default(),
        percent_change_7d: q.percent_change_7d.unwrap_or_default(),
        percent_change_30d: q.percent_change_30d.unwrap_or_default(),
        last_updated: q.last_updated,
    }
}

/// Construit l'erreur à partir d'une réponse non-2xx
///
/// CoinMarketCap renvoie le même envelope avec status.error_message
fn api_error(status: u16, body: &str) -> ProviderError {
    let message = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|e| e.status.error_message)
        .unwrap_or_else(|| body.chars().take(200).collect());
    ProviderError::Api { status, message }
}

// ============================================================================
// Client
// ============================================================================

/// Client CoinMarketCap
pub struct CoinMarketCap {
    client: reqwest::Client,
    base_url: String,
    api_key: RwLock<String>,
    catalog: OnceCell<Catalog>,
}

impl CoinMarketCap {
    /// Crée le client (aucun appel réseau ici)
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, BASE_URL)
    }

    /// Variante avec une URL de base différente (sandbox CMC)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_http_client()?,
            base_url: base_url.into(),
            api_key: RwLock::new(api_key.into()),
            catalog: OnceCell::new(),
        })
    }

    fn api_key(&self) -> Result<String, ProviderError> {
        let key = self
            .api_key
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey);
        }
        Ok(key)
    }

    /// GET authentifié, retourne le champ "data" désérialisé
    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ProviderError> {
        let key = self.api_key()?;
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Sending request to CoinMarketCap");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, key)
            .query(query)
            .send()
            .await
            .map_err(ProviderError::from_request)?;

        let status = response.status();
        let body = response.text().await.map_err(ProviderError::from_request)?;
        debug!(status = %status, bytes = body.len(), "Received HTTP response");

        if !status.is_success() {
            error!(status = %status, "CoinMarketCap returned error status");
            return Err(api_error(status.as_u16(), &body));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        match envelope.data {
            Some(data) => Ok(data),
            None => Err(ProviderError::Api {
                status: status.as_u16(),
                message: envelope
                    .status
                    .error_message
                    .unwrap_or_else(|| format!("empty response (code {})", envelope.status.error_code)),
            }),
        }
    }

    /// Retourne le catalogue, le charge au premier appel
    async fn catalog(&self) -> Result<&Catalog, ProviderError> {
        self.catalog.get_or_try_init(|| self.load_catalog()).await
    }

    #[instrument(skip(self))]
    async fn load_catalog(&self) -> Result<Catalog, ProviderError> {
        let listings: Vec<Listing> = self
            .get(
                "/v1/cryptocurrency/listings/latest",
                &[("limit", LISTING_LIMIT.to_string())],
            )
            .await?;

        let mut catalog = Catalog::from_listings(listings);
        debug!(
            symbols = catalog.symbols.len(),
            currencies = catalog.currencies.len(),
            "Fetched symbols"
        );

        let ids: Vec<String> = catalog.symbols.iter().map(|s| s.id.to_string()).collect();
        for batch in ids.chunks(INFO_BATCH) {
            let query = [("id", batch.join(","))];
            match self
                .get::<HashMap<String, CoinInfo>>("/v1/cryptocurrency/info", &query)
                .await
            {
                Ok(infos) => catalog.attach_icons(&infos),
                Err(e) => {
                    // Sans logos, le catalogue reste utilisable
                    warn!(error = %e, batch = batch.len(), "Failed to load symbol info");
                    break;
                }
            }
        }

        info!(symbols = catalog.symbols.len(), "Symbol catalog loaded");
        Ok(catalog)
    }
}

#[async_trait]
impl QuoteProvider for CoinMarketCap {
    async fn symbols(&self) -> Result<Vec<Symbol>, ProviderError> {
        Ok(self.catalog().await?.symbols.clone())
    }

    async fn currencies(&self) -> Result<Vec<String>, ProviderError> {
        Ok(self.catalog().await?.currencies.clone())
    }

    #[instrument(skip(self, tickers), fields(count = tickers.len()))]
    async fn quotes(&self, currency: &str, tickers: &[String]) -> Result<Vec<Quote>, ProviderError> {
        if tickers.is_empty() {
            return Ok(Vec::new());
        }

        let catalog = self.catalog().await?;
        let query = [
            ("symbol", tickers.join(",")),
            ("convert", currency.to_string()),
        ];
        let markets: HashMap<String, MarketQuote> = self
            .get("/v1/cryptocurrency/quotes/latest", &query)
            .await
            .map_err(|e| {
                error!(error = %e, symbols = %tickers.join(","), "Could not get latest quotes");
                e
            })?;

        let quotes = catalog.convert_quotes(markets, currency, tickers);
        info!(quotes = quotes.len(), "Fetched latest quotes");
        Ok(quotes)
    }

    fn set_api_key(&self, api_key: &str) {
        let mut key = self
            .api_key
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *key = api_key.to_string();
    }

    async fn find_symbol(&self, ticker: &str) -> Result<Option<Symbol>, ProviderError> {
        Ok(self.catalog().await?.find(ticker).cloned())
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================
// Aucun appel réseau : on parse des réponses enregistrées.
// ============================================================================
