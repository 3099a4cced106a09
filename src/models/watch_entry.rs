// ============================================================================
// Enum : WatchEntry
// ============================================================================
// Une ligne de la watchlist : soit un symbole sans cotation (pas encore
// récupérée), soit la dernière cotation connue.
//
// CONCEPT RUST : Enum "taggée" au lieu d'une liste non typée
// - Pending(Symbol) : coin ajouté, cotation pas encore chargée
// - Quoted(Quote)   : cotation disponible
// - Le compilateur force à traiter les deux cas, aucune conversion à l'exécution
// ============================================================================

use crate::error::TickerMismatch;
use crate::models::{format, Quote, Symbol};

/// Une entrée de la watchlist
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEntry {
    /// Symbole suivi, pas encore de cotation
    Pending(Symbol),

    /// Symbole avec sa dernière cotation
    Quoted(Quote),
}

impl WatchEntry {
    /// Symbole de l'entrée, quelle que soit la variante
    pub fn symbol(&self) -> &Symbol {
        match self {
            WatchEntry::Pending(symbol) => symbol,
            WatchEntry::Quoted(quote) => &quote.symbol,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.symbol().ticker
    }

    /// Dernière cotation connue
    pub fn quote(&self) -> Option<&Quote> {
        match self {
            WatchEntry::Pending(_) => None,
            WatchEntry::Quoted(quote) => Some(quote),
        }
    }

    pub fn has_quote(&self) -> bool {
        self.quote().is_some()
    }

    /// Produit l'entrée remplaçante pour une nouvelle cotation
    ///
    /// CONCEPT : Remplacement complet
    /// - On ne modifie pas self : on retourne une nouvelle valeur
    /// - Le store échange l'ancienne entrée contre la nouvelle sous son verrou
    /// - Le symbole de la cotation (catalogue à jour, icône) remplace l'ancien
    pub fn apply_quote(&self, quote: Quote) -> Result<WatchEntry, TickerMismatch> {
        if self.ticker() != quote.ticker() {
            return Err(TickerMismatch {
                entry: self.ticker().to_string(),
                quote: quote.ticker().to_string(),
            });
        }
        Ok(WatchEntry::Quoted(quote))
    }

    /// Variation sur 1h (utilisée pour la couleur du prix)
    pub fn change_1h(&self) -> Option<f64> {
        self.quote().map(|q| q.percent_change_1h)
    }

    /// Formatte la ligne principale de la liste
    ///
    /// Format : "BTC      Bitcoin               43.21K  V: 12.3B  mc: 845.1B"
    ///
    /// Le nom est tronqué à 20 caractères pour éviter le débordement
    pub fn display(&self) -> String {
        let symbol = self.symbol();

        let truncated_name = if symbol.name.chars().count() <= 20 {
            symbol.name.clone()
        } else {
            let truncated: String = symbol.name.chars().take(19).collect();
            format!("{}…", truncated)
        };

        match self.quote() {
            Some(quote) => format!(
                "{:<8} {:<20} {:>10}  {:>10}  {:>12}",
                symbol.ticker,
                truncated_name,
                format::format_number("", quote.price, 2),
                format::format_number("V: ", quote.volume_24h, 1),
                format::format_number("mc: ", quote.market_cap, 1),
            ),
            None => format!("{:<8} {:<20} {:>10}", symbol.ticker, truncated_name, "Loading..."),
        }
    }

    /// Variations détaillées : [("H", 1h), ("D", 24h), ("W", 7d), ("M", 30d)]
    pub fn changes(&self) -> Vec<(&'static str, f64)> {
        match self.quote() {
            Some(q) => vec![
                ("H", q.percent_change_1h),
                ("D", q.percent_change_24h),
                ("W", q.percent_change_7d),
                ("M", q.percent_change_30d),
            ],
            None => Vec::new(),
        }
    }
}

impl From<Symbol> for WatchEntry {
    fn from(symbol: Symbol) -> Self {
        WatchEntry::Pending(symbol)
    }
}

impl From<Quote> for WatchEntry {
    fn from(quote: Quote) -> Self {
        WatchEntry::Quoted(quote)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn btc() -> Symbol {
        Symbol::new(1, "BTC", "Bitcoin")
    }

    #[test]
    fn test_pending_entry() {
        let entry = WatchEntry::from(btc());
        assert_eq!(entry.ticker(), "BTC");
        assert!(!entry.has_quote());
        assert!(entry.display().contains("Loading..."));
        assert!(entry.changes().is_empty());
    }

    #[test]
    fn test_apply_quote_replaces_whole_value() {
        let entry = WatchEntry::from(btc());
        let quote = Quote::new(btc().with_icon("https://s2.coinmarketcap.com/64x64/1.png"), 43_000.0);

        let updated = entry.apply_quote(quote.clone()).unwrap();
        assert_eq!(updated, WatchEntry::Quoted(quote));
        // L'entrée d'origine n'a pas bougé
        assert!(!entry.has_quote());
        // Le symbole vient de la cotation
        assert!(updated.symbol().icon_url.is_some());
    }

    #[test]
    fn test_apply_quote_ticker_mismatch() {
        let entry = WatchEntry::from(btc());
        let quote = Quote::new(Symbol::new(1027, "ETH", "Ethereum"), 2_000.0);

        let err = entry.apply_quote(quote).unwrap_err();
        assert_eq!(err.entry, "BTC");
        assert_eq!(err.quote, "ETH");
    }

    #[test]
    fn test_display_truncates_long_names() {
        let entry = WatchEntry::from(Symbol::bare("LONG", "A very very long coin name indeed"));
        assert!(entry.display().contains('…'));
    }

    #[test]
    fn test_display_quoted() {
        let mut quote = Quote::new(btc(), 43_210.0);
        quote.volume_24h = 12.3e9;
        let entry = WatchEntry::from(quote);
        let line = entry.display();
        assert!(line.contains("43.21K"));
        assert!(line.contains("V: 12.3B"));
    }
}
