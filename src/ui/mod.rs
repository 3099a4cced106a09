// ============================================================================
// Module : ui
// ============================================================================
// Interface terminal (ratatui + crossterm)
// ============================================================================

pub mod dashboard; // Rendu de l'interface
pub mod events;    // Gestion des événements clavier

pub use dashboard::render;
pub use events::{Event, EventHandler};
