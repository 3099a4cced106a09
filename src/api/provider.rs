// ============================================================================
// Trait : QuoteProvider
// ============================================================================
// Contrat étroit entre le cœur de l'application et le fournisseur de données
// de marché : catalogue de symboles, liste des devises, cotations groupées.
//
// CONCEPT RUST : async_trait
// - Les méthodes async dans un trait objet (dyn QuoteProvider) passent par
//   async_trait, qui boxe les futures
// - Send + Sync : le fournisseur est partagé entre le timer et le worker
// ============================================================================

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::models::{Quote, Symbol};

/// Fournisseur de cotations
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Catalogue complet, ordonné (relativement statique sur une session)
    async fn symbols(&self) -> Result<Vec<Symbol>, ProviderError>;

    /// Codes de devises disponibles, ordonnés
    async fn currencies(&self) -> Result<Vec<String>, ProviderError>;

    /// Cotations pour plusieurs tickers en un seul appel
    ///
    /// Un seul appel couvre toute la watchlist (limites de débit du fournisseur).
    /// Les cotations sont retournées dans l'ordre des tickers demandés ; les
    /// tickers inconnus sont absents du résultat.
    async fn quotes(&self, currency: &str, tickers: &[String]) -> Result<Vec<Quote>, ProviderError>;

    /// Remplace la clé API (écran des paramètres)
    fn set_api_key(&self, _api_key: &str) {}

    /// Recherche un symbole du catalogue par ticker
    async fn find_symbol(&self, ticker: &str) -> Result<Option<Symbol>, ProviderError> {
        let symbols = self.symbols().await?;
        Ok(symbols.into_iter().find(|s| s.ticker == ticker))
    }
}

// ============================================================================
// Double de test
// ============================================================================
