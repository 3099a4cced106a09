// ============================================================================
// Structure : Quote
// ============================================================================
// Instantané de marché pour un Symbol dans une devise d'affichage.
//
// Une Quote est une valeur : pour mettre à jour une ligne de la watchlist on
// remplace la Quote entière, on ne modifie jamais ses champs un par un.
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Symbol;

/// Cotation d'une cryptomonnaie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,

    pub price: f64,
    pub volume_24h: f64,
    pub volume_7d: f64,
    pub volume_30d: f64,
    pub market_cap: f64,

    /// Variations en pourcentage
    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub percent_change_7d: f64,
    pub percent_change_30d: f64,

    /// Horodatage fourni par le fournisseur (peut être absent)
    pub last_updated: Option<DateTime<Utc>>,
}

impl Quote {
    /// Cotation avec un prix, toutes les autres métriques à zéro
    pub fn new(symbol: Symbol, price: f64) -> Self {
        Self {
            symbol,
            price,
            volume_24h: 0.0,
            volume_7d: 0.0,
            volume_30d: 0.0,
            market_cap: 0.0,
            percent_change_1h: 0.0,
            percent_change_24h: 0.0,
            percent_change_7d: 0.0,
            percent_change_30d: 0.0,
            last_updated: None,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.symbol.ticker
    }
}
