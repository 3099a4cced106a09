// ============================================================================
// AppContext : contexte applicatif explicite
// ============================================================================
// Regroupe tout ce qui vit le temps du processus : paramètres, fournisseur de
// cotations, watchlist, boucle de rafraîchissement, cache d'icônes.
//
// Créé au démarrage (bootstrap), passé par référence (Arc) au worker et à
// l'UI, détruit à la sortie. Pas de singleton global.
//
// Les opérations du cœur (add, remove, refresh, paramètres, save, reload) sont
// appelables directement : la confirmation éventuelle se fait dans l'UI.
//
// Les lectures/écritures de fichiers passent par le pool bloquant de tokio.
// ============================================================================

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::api::{CoinMarketCap, HttpIconSource, IconSource, QuoteProvider};
use crate::cache::{self, Bitmap, ImageCache};
use crate::error::ProviderError;
use crate::models::{parse_ticker_input, Symbol, WatchEntry};
use crate::persistence::settings::{api_key_from_env, resolve_api_key};
use crate::persistence::{self, Settings, Storage};
use crate::refresh::{Progress, RefreshLoop};
use crate::store::{WatchlistChange, WatchlistStore};

/// Contexte de l'application
pub struct AppContext {
    storage: Storage,
    settings: Arc<RwLock<Settings>>,
    provider: Arc<dyn QuoteProvider>,
    store: Arc<WatchlistStore>,
    refresh: Arc<RefreshLoop>,
    icons: ImageCache,
    icon_source: Arc<dyn IconSource>,
}

impl AppContext {
    /// Démarrage complet avec CoinMarketCap et le téléchargement HTTP
    pub async fn bootstrap(storage: Storage) -> Result<Self> {
        let persisted = persistence::load_settings(&storage);
        let api_key = resolve_api_key(
            persisted.as_ref().map(|s| s.api_key.as_str()),
            api_key_from_env(),
        );
        if api_key.is_empty() {
            warn!("No CoinMarketCap API key configured");
        }

        let provider: Arc<dyn QuoteProvider> = Arc::new(CoinMarketCap::new(api_key.clone())?);
        let icon_source: Arc<dyn IconSource> = Arc::new(HttpIconSource::new()?);

        Ok(Self::start(storage, persisted, api_key, provider, icon_source).await)
    }

    /// Démarrage avec des collaborateurs fournis
    ///
    /// 1. paramètres : ceux du fichier, sinon les défauts (sauvegardés)
    /// 2. watchlist : coins.json, sinon la liste de démarrage
    /// 3. un cycle de fetch groupé
    pub async fn start(
        storage: Storage,
        persisted: Option<Settings>,
        api_key: String,
        provider: Arc<dyn QuoteProvider>,
        icon_source: Arc<dyn IconSource>,
    ) -> Self {
        let settings = match persisted {
            Some(mut settings) => {
                settings.api_key = api_key;
                settings
            }
            None => {
                info!("Loading default settings");
                let currencies = provider.currencies().await.unwrap_or_else(|e| {
                    error!(error = %e, "Could not get currency list");
                    Vec::new()
                });
                let settings = Settings::defaults(api_key, &currencies);
                write_settings(storage.clone(), settings.clone()).await;
                settings
            }
        };

        let ctx = Self::new(storage, settings, provider, icon_source);
        ctx.reload_watchlist().await;
        ctx
    }

    /// Assemble le contexte sans rien charger
    pub fn new(
        storage: Storage,
        settings: Settings,
        provider: Arc<dyn QuoteProvider>,
        icon_source: Arc<dyn IconSource>,
    ) -> Self {
        let settings = Arc::new(RwLock::new(settings));
        let store = Arc::new(WatchlistStore::new());
        let refresh = Arc::new(RefreshLoop::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            Arc::clone(&settings),
        ));

        Self {
            icons: ImageCache::new(storage.clone()),
            storage,
            settings,
            provider,
            store,
            refresh,
            icon_source,
        }
    }

    // ========================================================================
    // Accès
    // ========================================================================

    pub fn store(&self) -> &Arc<WatchlistStore> {
        &self.store
    }

    pub fn refresh_loop(&self) -> &Arc<RefreshLoop> {
        &self.refresh
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Copie des paramètres courants
    pub fn settings(&self) -> Settings {
        self.settings.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Notifications de la watchlist
    pub fn subscribe(&self) -> broadcast::Receiver<WatchlistChange> {
        self.store.subscribe()
    }

    /// Progression vers le prochain rafraîchissement
    pub fn progress(&self) -> watch::Receiver<Progress> {
        self.refresh.subscribe_progress()
    }

    // ========================================================================
    // Watchlist
    // ========================================================================

    /// Ajoute un coin, avec sa cotation si le fournisseur répond
    ///
    /// La cotation est récupérée AVANT d'entrer dans le store (pas de verrou
    /// pendant le réseau). Retourne false si le coin est déjà suivi.
    pub async fn add_symbol(&self, symbol: Symbol) -> bool {
        if self.store.contains(&symbol.ticker) {
            debug!(ticker = %symbol.ticker, "Symbol already watched");
            return false;
        }

        let currency = self.settings().currency;
        let entry = match self
            .provider
            .quotes(&currency, std::slice::from_ref(&symbol.ticker))
            .await
        {
            Ok(quotes) => match quotes.into_iter().find(|q| q.ticker() == symbol.ticker) {
                Some(quote) => WatchEntry::Quoted(quote),
                None => WatchEntry::Pending(symbol),
            },
            Err(e) => {
                warn!(ticker = %symbol.ticker, error = %e, "Adding symbol without quote");
                WatchEntry::Pending(symbol)
            }
        };

        self.store.add(entry)
    }

    /// Ajoute un coin à partir d'une saisie ("btc" ou "BTC (Bitcoin)")
    ///
    /// Le ticker doit exister dans le catalogue du fournisseur.
    pub async fn add_ticker(&self, input: &str) -> Result<bool, ProviderError> {
        let ticker = parse_ticker_input(input).ok_or_else(|| ProviderError::UnknownSymbol(input.to_string()))?;

        match self.provider.find_symbol(&ticker).await? {
            Some(symbol) => Ok(self.add_symbol(symbol).await),
            None => Err(ProviderError::UnknownSymbol(ticker)),
        }
    }

    /// Retire un coin de la watchlist
    pub fn remove_symbol(&self, ticker: &str) -> bool {
        self.store.remove(ticker)
    }

    /// Rafraîchissement manuel
    pub async fn refresh_now(&self) {
        self.refresh.refresh_now().await;
    }

    /// Sauvegarde la watchlist dans coins.json
    pub async fn save_watchlist(&self) -> Result<()> {
        let storage = self.storage.clone();
        let entries = self.store.list();
        on_blocking_pool(move || persistence::save_coins(&storage, &entries)).await
    }

    /// Recharge la watchlist depuis coins.json
    ///
    /// Fichier absent ou illisible -> BTC, ETH, DOT, ADA. Chaque symbole est
    /// complété depuis le catalogue (id, icône) quand il est disponible, puis
    /// un seul cycle de fetch couvre toute la liste.
    pub async fn reload_watchlist(&self) {
        let storage = self.storage.clone();
        let saved = on_blocking_pool(move || Ok(persistence::load_coins(&storage)))
            .await
            .unwrap_or_else(|e| {
                error!(error = ?e, "Could not read saved watchlist");
                None
            })
            .unwrap_or_else(|| {
                info!("Using starter watchlist");
                persistence::starter_symbols()
            });

        let catalog = match self.provider.symbols().await {
            Ok(symbols) => symbols,
            Err(e) => {
                warn!(error = %e, "Catalog unavailable, keeping saved symbols as-is");
                Vec::new()
            }
        };

        let entries: Vec<WatchEntry> = saved
            .into_iter()
            .map(|bare| {
                catalog
                    .iter()
                    .find(|s| s.ticker == bare.ticker)
                    .cloned()
                    .unwrap_or(bare)
                    .into()
            })
            .collect();

        self.store.replace_all(entries);
        self.refresh.refresh_now().await;
    }

    /// Coins du catalogue pas encore suivis, filtrés par ticker ou nom
    pub async fn symbol_suggestions(&self, filter: &str) -> Result<Vec<Symbol>, ProviderError> {
        let filter = filter.trim().to_lowercase();
        let symbols = self.provider.symbols().await?;
        Ok(symbols
            .into_iter()
            .filter(|s| !self.store.contains(&s.ticker))
            .filter(|s| {
                filter.is_empty()
                    || s.ticker.to_lowercase().starts_with(&filter)
                    || s.name.to_lowercase().contains(&filter)
            })
            .collect())
    }

    // ========================================================================
    // Paramètres
    // ========================================================================

    /// Devises proposées par le fournisseur
    pub async fn currencies(&self) -> Result<Vec<String>, ProviderError> {
        self.provider.currencies().await
    }

    /// Change la devise d'affichage : sauvegarde puis rafraîchit
    pub async fn set_currency(&self, currency: &str) {
        {
            let mut settings = self.settings.write().unwrap_or_else(|p| p.into_inner());
            settings.currency = currency.to_string();
        }
        info!(currency = %currency, "Display currency changed");
        self.persist_settings().await;
        self.refresh.refresh_now().await;
    }

    /// Met à jour la clé API et l'intervalle, puis sauvegarde
    ///
    /// Le nouvel intervalle ne s'applique qu'au prochain tick.
    pub async fn update_settings(&self, api_key: &str, refresh_interval: Duration) {
        {
            let mut settings = self.settings.write().unwrap_or_else(|p| p.into_inner());
            settings.api_key = api_key.trim().to_string();
            settings.refresh_interval = refresh_interval;
        }
        self.provider.set_api_key(api_key.trim());
        info!(interval_secs = refresh_interval.as_secs(), "Settings updated");
        self.persist_settings().await;
    }

    async fn persist_settings(&self) {
        write_settings(self.storage.clone(), self.settings()).await;
    }

    // ========================================================================
    // Icônes
    // ========================================================================

    /// Icône d'une URL (remplaçant si l'URL est vide ou en cas d'échec)
    pub async fn resolve_icon(&self, url: &str) -> Bitmap {
        if url.is_empty() {
            return cache::placeholder();
        }
        cache::resolve_icon(&self.icons, self.icon_source.as_ref(), url).await
    }
}

/// Exécute une I/O disque sur le pool bloquant de tokio
async fn on_blocking_pool<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

async fn write_settings(storage: Storage, settings: Settings) {
    if let Err(e) = on_blocking_pool(move || persistence::save_settings(&storage, &settings)).await {
        error!(error = ?e, "Could not write settings");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use temp_dir::TempDir;

    use super::*;
    use crate::api::provider::testing::StaticProvider;
    use crate::persistence::settings::SETTINGS_FILE;

    /// Pas de réseau
    struct Offline;

    #[async_trait]
    impl IconSource for Offline {
        async fn fetch(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("offline")
        }
    }

    async fn start(dir: &TempDir, provider: Arc<StaticProvider>, persisted: Option<Settings>) -> AppContext {
        AppContext::start(
            Storage::new(dir.path()),
            persisted,
            "key".to_string(),
            provider,
            Arc::new(Offline),
        )
        .await
    }

    fn tickers(ctx: &AppContext) -> Vec<String> {
        ctx.store().tickers()
    }

    #[tokio::test]
    async fn test_first_run_uses_defaults_and_starter_list() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(StaticProvider::new());
        let ctx = start(&dir, Arc::clone(&provider), None).await;

        let settings = ctx.settings();
        assert_eq!(settings.currency, "EUR");
        assert_eq!(settings.api_key, "key");
        assert!(ctx.storage().exists(SETTINGS_FILE));

        assert_eq!(tickers(&ctx), vec!["BTC", "ETH", "DOT", "ADA"]);
        // Un seul appel groupé pour toute la liste
        assert_eq!(provider.quote_calls(), 1);
        assert!(ctx.store().list().iter().all(|e| e.has_quote()));
        // Symboles complétés depuis le catalogue
        let (_, btc) = ctx.store().find_by_ticker("BTC").unwrap();
        assert_eq!(btc.symbol().id, 1);
    }

    #[tokio::test]
    async fn test_offline_first_run_falls_back() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(StaticProvider::new());
        provider.set_failing(true);
        let ctx = start(&dir, provider, None).await;

        assert_eq!(ctx.settings().currency, "USD");
        assert_eq!(tickers(&ctx), vec!["BTC", "ETH", "DOT", "ADA"]);
        assert!(ctx.store().list().iter().all(|e| !e.has_quote()));
    }

    #[tokio::test]
    async fn test_add_symbol_fetches_quote_and_ignores_duplicates() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(StaticProvider::new());
        let ctx = start(&dir, Arc::clone(&provider), None).await;
        let calls = provider.quote_calls();

        let sol = Symbol::new(5426, "SOL", "Solana");
        assert!(ctx.add_symbol(sol.clone()).await);
        assert_eq!(provider.quote_calls(), calls + 1);
        let (index, entry) = ctx.store().find_by_ticker("SOL").unwrap();
        assert_eq!(index, 4);
        assert_eq!(entry.quote().unwrap().price, 98.0);

        let before = ctx.store().list();
        assert!(!ctx.add_symbol(sol).await);
        assert_eq!(ctx.store().list(), before);
        assert_eq!(provider.quote_calls(), calls + 1);
    }

    #[tokio::test]
    async fn test_add_ticker_from_input() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(StaticProvider::new());
        let ctx = start(&dir, Arc::clone(&provider), None).await;

        assert!(ctx.add_ticker("sol (Solana)").await.unwrap());
        assert!(ctx.store().contains("SOL"));

        assert!(matches!(
            ctx.add_ticker("XYZ").await,
            Err(ProviderError::UnknownSymbol(t)) if t == "XYZ"
        ));
        assert!(ctx.add_ticker("  ").await.is_err());

        provider.set_failing(true);
        assert!(ctx.add_ticker("DOGE").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_then_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(StaticProvider::new());
        let ctx = start(&dir, Arc::clone(&provider), None).await;

        assert!(ctx.remove_symbol("DOT"));
        assert!(ctx.remove_symbol("ADA"));
        assert!(!ctx.remove_symbol("ADA"));
        ctx.save_watchlist().await.unwrap();

        ctx.add_symbol(Symbol::new(5426, "SOL", "Solana")).await;
        assert_eq!(tickers(&ctx), vec!["BTC", "ETH", "SOL"]);

        ctx.reload_watchlist().await;
        assert_eq!(tickers(&ctx), vec!["BTC", "ETH"]);

        // Nouvelle session : même liste
        let next = start(&dir, provider, Some(ctx.settings())).await;
        assert_eq!(tickers(&next), vec!["BTC", "ETH"]);
    }

    #[tokio::test]
    async fn test_set_currency_persists_and_refreshes() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(StaticProvider::new());
        let ctx = start(&dir, Arc::clone(&provider), None).await;
        let calls = provider.quote_calls();

        ctx.set_currency("USD").await;

        assert_eq!(provider.quote_calls(), calls + 1);
        let saved = persistence::load_settings(ctx.storage()).unwrap();
        assert_eq!(saved.currency, "USD");
    }

    #[tokio::test]
    async fn test_update_settings() {
        let dir = TempDir::new().unwrap();
        let ctx = start(&dir, Arc::new(StaticProvider::new()), None).await;

        ctx.update_settings(" new-key ", Duration::from_secs(15 * 60)).await;

        let saved = persistence::load_settings(ctx.storage()).unwrap();
        assert_eq!(saved.api_key, "new-key");
        assert_eq!(saved.refresh_interval, Duration::from_secs(15 * 60));
        assert_eq!(ctx.settings(), saved);
    }

    #[tokio::test]
    async fn test_symbol_suggestions_exclude_watched() {
        let dir = TempDir::new().unwrap();
        let ctx = start(&dir, Arc::new(StaticProvider::new()), None).await;

        let all = ctx.symbol_suggestions("").await.unwrap();
        assert_eq!(all.iter().map(|s| s.ticker.as_str()).collect::<Vec<_>>(), vec!["SOL"]);

        ctx.remove_symbol("ETH");
        let eth = ctx.symbol_suggestions("ether").await.unwrap();
        assert_eq!(eth.len(), 1);
        assert_eq!(eth[0].ticker, "ETH");
    }

    #[tokio::test]
    async fn test_resolve_icon_offline_gives_placeholder() {
        let dir = TempDir::new().unwrap();
        let ctx = start(&dir, Arc::new(StaticProvider::new()), None).await;

        assert_eq!(ctx.resolve_icon("https://example.com/64x64/1.png").await, cache::placeholder());
        assert_eq!(ctx.resolve_icon("").await, cache::placeholder());
    }
}
