// ============================================================================
// Module : api
// ============================================================================
// Clients réseau : fournisseur de cotations (CoinMarketCap) et source des
// icônes. Le cœur de l'application ne dépend que des traits.
// ============================================================================

use std::time::Duration;

use crate::error::ProviderError;

pub mod coinmarketcap; // Client CoinMarketCap
pub mod icons;         // Téléchargement des logos
pub mod provider;      // Trait QuoteProvider

// Re-export des types principaux
pub use coinmarketcap::CoinMarketCap;
pub use icons::{HttpIconSource, IconSource};
pub use provider::QuoteProvider;

/// Délai maximal d'une requête HTTP
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Client HTTP partagé par les appels réseau de l'application
pub(crate) fn build_http_client() -> Result<reqwest::Client, ProviderError> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("coinwatcher/", env!("CARGO_PKG_VERSION")))
        .timeout(HTTP_TIMEOUT)
        .build()?;
    Ok(client)
}
