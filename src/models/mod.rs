// ============================================================================
// Module : models
// ============================================================================
// Structures de données de l'application : symboles, cotations, entrées de
// la watchlist et formatage pour l'affichage.
// ============================================================================

pub mod format;      // Abréviation des nombres (K, M, B...) et tendances
pub mod quote;       // Cotation (Quote)
pub mod symbol;      // Identité d'une crypto (Symbol)
pub mod watch_entry; // Ligne de la watchlist (WatchEntry)

// Re-export des structures principales
// Au lieu de : use coinwatcher::models::symbol::Symbol;
// On peut faire : use coinwatcher::models::Symbol;
pub use format::{format_change, format_number, Trend};
pub use quote::Quote;
pub use symbol::{parse_ticker_input, Symbol};
pub use watch_entry::WatchEntry;
