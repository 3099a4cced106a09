// ============================================================================
// Module : store
// ============================================================================
// La watchlist partagée entre le timer de rafraîchissement et l'UI.
// ============================================================================

pub mod watchlist;

pub use watchlist::{WatchlistChange, WatchlistStore};
