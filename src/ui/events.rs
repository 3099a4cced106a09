// ============================================================================
// Gestion des événements
// ============================================================================
// Lecture des événements clavier (crossterm) avec un timeout : sans touche
// pressée, on produit un Tick pour que la boucle redessine la progression.
// ============================================================================

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Délai d'attente d'une touche avant de produire un Tick
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Événements de l'application
#[derive(Debug, Clone)]
pub enum Event {
    /// Touche pressée
    Key(KeyEvent),

    /// Tick régulier (redessin)
    Tick,
}

/// Gestionnaire d'événements
pub struct EventHandler;

impl EventHandler {
    pub fn new() -> Self {
        Self
    }

    /// Lit le prochain événement (bloquant au plus POLL_TIMEOUT)
    pub fn next(&self) -> Result<Event> {
        if !event::poll(POLL_TIMEOUT)? {
            return Ok(Event::Tick);
        }

        match event::read()? {
            // Certains OS envoient Press ET Release : on ne garde que Press
            CrosstermEvent::Key(key) if key.kind == KeyEventKind::Press => Ok(Event::Key(key)),
            _ => Ok(Event::Tick),
        }
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Helpers : identifier une touche
// ============================================================================

fn key_code(event: &Event) -> Option<KeyCode> {
    match event {
        Event::Key(key) => Some(key.code),
        Event::Tick => None,
    }
}

fn is_char(event: &Event, lower: char) -> bool {
    matches!(key_code(event), Some(KeyCode::Char(c)) if c.to_ascii_lowercase() == lower)
}

/// 'q' : quitter
pub fn is_quit_event(event: &Event) -> bool {
    is_char(event, 'q')
}

/// Ctrl+C : quitter sans confirmation
pub fn is_interrupt_event(event: &Event) -> bool {
    match event {
        Event::Key(key) => key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL),
        Event::Tick => false,
    }
}

pub fn is_escape_event(event: &Event) -> bool {
    key_code(event) == Some(KeyCode::Esc)
}

pub fn is_enter_event(event: &Event) -> bool {
    key_code(event) == Some(KeyCode::Enter)
}

pub fn is_tab_event(event: &Event) -> bool {
    key_code(event) == Some(KeyCode::Tab)
}

pub fn is_backspace_event(event: &Event) -> bool {
    key_code(event) == Some(KeyCode::Backspace)
}

/// Flèche haut ou 'k' (vim)
pub fn is_up_event(event: &Event) -> bool {
    key_code(event) == Some(KeyCode::Up) || is_char(event, 'k')
}

/// Flèche bas ou 'j' (vim)
pub fn is_down_event(event: &Event) -> bool {
    key_code(event) == Some(KeyCode::Down) || is_char(event, 'j')
}

pub fn is_left_event(event: &Event) -> bool {
    key_code(event) == Some(KeyCode::Left)
}

pub fn is_right_event(event: &Event) -> bool {
    key_code(event) == Some(KeyCode::Right)
}

/// Espace ou Entrée : déplier le détail de la ligne
pub fn is_detail_event(event: &Event) -> bool {
    matches!(key_code(event), Some(KeyCode::Char(' ')) | Some(KeyCode::Enter))
}

/// 'a' : ajouter un coin
pub fn is_add_event(event: &Event) -> bool {
    is_char(event, 'a')
}

/// 'd' : supprimer le coin sélectionné
pub fn is_delete_event(event: &Event) -> bool {
    is_char(event, 'd') || key_code(event) == Some(KeyCode::Delete)
}

/// 'r' : rafraîchir maintenant
pub fn is_refresh_event(event: &Event) -> bool {
    is_char(event, 'r')
}

/// 'c' : devise suivante
pub fn is_currency_event(event: &Event) -> bool {
    is_char(event, 'c')
}

/// 's' : sauvegarder la watchlist
pub fn is_save_event(event: &Event) -> bool {
    is_char(event, 's')
}

/// 'l' : recharger la watchlist sauvegardée
pub fn is_reload_event(event: &Event) -> bool {
    is_char(event, 'l')
}

/// 'p' : paramètres
pub fn is_settings_event(event: &Event) -> bool {
    is_char(event, 'p')
}

pub fn is_yes_event(event: &Event) -> bool {
    is_char(event, 'y')
}

pub fn is_no_event(event: &Event) -> bool {
    is_char(event, 'n') || is_escape_event(event)
}

/// Caractère saisissable (ticker, nom, clé API)
pub fn is_text_char_event(event: &Event) -> bool {
    matches!(key_code(event), Some(KeyCode::Char(c)) if !c.is_control())
}

/// Extrait le caractère d'un événement clavier
pub fn get_char_from_event(event: &Event) -> Option<char> {
    match key_code(event) {
        Some(KeyCode::Char(c)) => Some(c),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
