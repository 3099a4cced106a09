// ============================================================================
// Module : persistence
// ============================================================================
// Fichiers persistés : paramètres, watchlist sauvegardée, et le répertoire
// de stockage commun (utilisé aussi par le cache d'icônes).
// ============================================================================

pub mod coins;    // coins.json
pub mod settings; // config.json
pub mod storage;  // Répertoire de données

pub use coins::{load_coins, save_coins, starter_symbols};
pub use settings::{load_settings, save_settings, Settings, INTERVAL_OPTIONS};
pub use storage::Storage;
