// ============================================================================
// Erreurs typées
// ============================================================================
// La bibliothèque distingue :
// - les erreurs du fournisseur de cotations (réseau, auth, quota, parsing)
// - les incohérences de données (cotation appliquée au mauvais ticker)
//
// Le binaire, lui, utilise anyhow pour la plomberie (fichiers, terminal).
// Aucune de ces erreurs ne doit arrêter le processus : elles sont loguées
// et l'application continue avec la dernière valeur connue.
// ============================================================================

use thiserror::Error;

/// Erreurs du fournisseur de cotations
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Échec réseau (connexion, TLS, corps illisible)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Le délai de 5 secondes du client HTTP est dépassé
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Réponse non-2xx du fournisseur (clé invalide, quota dépassé...)
    #[error("provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Aucune clé API configurée
    #[error("no API key configured (set COINWATCHER_KEY or edit the settings)")]
    MissingApiKey,

    /// JSON inattendu
    #[error("could not decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Ticker absent du catalogue
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}

impl ProviderError {
    /// Convertit une erreur reqwest en distinguant les timeouts
    pub fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else {
            ProviderError::Http(err)
        }
    }
}

/// Une cotation a été appliquée à une entrée d'un autre ticker
///
/// C'est une erreur de programmation : elle est loguée et la mise à jour
/// est ignorée, jamais propagée.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ticker mismatch: entry {entry} cannot take a quote for {quote}")]
pub struct TickerMismatch {
    pub entry: String,
    pub quote: String,
}
