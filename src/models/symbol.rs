// ============================================================================
// Structure : Symbol
// ============================================================================
// Identité d'une cryptomonnaie telle que fournie par le fournisseur de données
// (id, ticker, nom, URL de l'icône).
//
// Un Symbol est immuable une fois récupéré : on le clone, on ne le modifie pas.
// Dans un même contexte de devise, le ticker est unique.
// ============================================================================

use serde::{Deserialize, Serialize};

/// Identité d'une cryptomonnaie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Identifiant interne du fournisseur (0 si inconnu, ex: chargé depuis coins.json)
    pub id: u64,

    /// Ticker (ex: "BTC")
    pub ticker: String,

    /// Nom complet (ex: "Bitcoin")
    pub name: String,

    /// URL du logo, None tant que le catalogue ne l'a pas fourni
    pub icon_url: Option<String>,
}

impl Symbol {
    /// Crée un symbole complet
    pub fn new(id: u64, ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            ticker: ticker.into(),
            name: name.into(),
            icon_url: None,
        }
    }

    /// Crée un symbole "nu" : seulement ticker + nom, sans id ni icône
    ///
    /// C'est la forme persistée dans la watchlist sauvegardée.
    pub fn bare(ticker: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(0, ticker, name)
    }

    /// Ajoute l'URL de l'icône (builder)
    pub fn with_icon(mut self, url: impl Into<String>) -> Self {
        self.icon_url = Some(url.into());
        self
    }

    /// Libellé utilisé par les suggestions : "BTC (Bitcoin)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.ticker, self.name)
    }
}

/// Extrait le ticker d'une saisie utilisateur
///
/// Accepte "btc", "BTC" ou la forme suggérée "BTC (Bitcoin)".
/// Retourne None pour une saisie vide.
pub fn parse_ticker_input(input: &str) -> Option<String> {
    let head = input.split('(').next().unwrap_or_default().trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_uppercase())
    }
}
