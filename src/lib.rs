// ============================================================================
// CoinWatcher - Library
// ============================================================================
// Expose les modules publics pour le binaire et les tests
// ============================================================================

pub mod api;         // CoinMarketCap et téléchargement des icônes
pub mod app;         // État de l'interface
pub mod cache;       // Cache des icônes
pub mod context;     // Contexte applicatif (opérations du cœur)
pub mod error;       // Erreurs typées
pub mod models;      // Structures de données
pub mod persistence; // Fichiers de paramètres et de watchlist
pub mod refresh;     // Rafraîchissement périodique
pub mod store;       // Watchlist partagée
pub mod ui;          // Interface utilisateur
