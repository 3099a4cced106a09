// ============================================================================
// Structure : App
// ============================================================================
// État de l'interface TUI : écran courant, sélection, saisies en cours,
// dernière copie de la watchlist et de la progression.
//
// L'état métier (watchlist, paramètres) vit dans AppContext. App n'en garde
// qu'une copie pour le rendu, rafraîchie à chaque notification du store.
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::models::{Symbol, WatchEntry};
use crate::persistence::{Settings, INTERVAL_OPTIONS};
use crate::refresh::Progress;

/// Nombre maximum de suggestions affichées
pub const MAX_SUGGESTIONS: usize = 8;

/// Action qui attend une confirmation (y / n)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingAction {
    /// Retirer ce ticker de la watchlist
    Delete(String),
    Save,
    Reload,
    Quit,
}

impl PendingAction {
    /// Question posée dans le footer
    pub fn prompt(&self) -> String {
        match self {
            PendingAction::Delete(ticker) => format!("Remove {} from the watchlist?", ticker),
            PendingAction::Save => "Save the watchlist?".to_string(),
            PendingAction::Reload => "Reload the saved watchlist? Unsaved changes are lost.".to_string(),
            PendingAction::Quit => "Quit CoinWatcher?".to_string(),
        }
    }
}

/// Écrans de l'application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// Vue principale : la watchlist
    Dashboard,

    /// Saisie d'un coin à ajouter, avec suggestions
    AddCoin,

    /// Édition de la clé API et de l'intervalle
    Settings,

    /// Question y / n avant une action
    Confirm(PendingAction),
}

/// Formulaire de l'écran Settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsForm {
    pub api_key: String,
    pub interval_index: usize,
}

impl SettingsForm {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            api_key: settings.api_key.clone(),
            interval_index: settings.interval_option_index(),
        }
    }

    pub fn next_interval(&mut self) {
        self.interval_index = (self.interval_index + 1).min(INTERVAL_OPTIONS.len() - 1);
    }

    pub fn previous_interval(&mut self) {
        self.interval_index = self.interval_index.saturating_sub(1);
    }

    pub fn interval(&self) -> Duration {
        INTERVAL_OPTIONS[self.interval_index].1
    }

    pub fn interval_label(&self) -> &'static str {
        INTERVAL_OPTIONS[self.interval_index].0
    }
}

/// Icône d'une ligne
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconState {
    /// Demandée au worker, pas encore reçue
    Loading,

    /// Couleur moyenne de l'icône (None : icône vide ou remplaçant)
    Ready(Option<(u8, u8, u8)>),
}

/// État principal de l'application
pub struct App {
    pub running: bool,
    pub current_screen: Screen,

    /// Copie de la watchlist pour le rendu
    pub entries: Vec<WatchEntry>,
    pub selected_index: usize,

    /// Tickers dont le détail (H/D/W/M) est déplié
    pub expanded: HashSet<String>,

    /// Icônes par ticker
    pub icons: HashMap<String, IconState>,

    pub progress: Progress,
    pub currency: String,
    pub currencies: Vec<String>,

    /// Buffer de l'écran AddCoin
    pub input_buffer: String,

    /// Coins du catalogue non suivis (None : pas encore chargés)
    pub suggestions: Option<Vec<Symbol>>,

    pub settings_form: SettingsForm,

    /// Message d'information ou d'erreur dans le header
    pub status: Option<String>,

    /// Une opération du worker est en cours
    pub busy: Option<String>,
}

impl App {
    pub fn new(settings: &Settings) -> Self {
        Self {
            running: true,
            current_screen: Screen::Dashboard,
            entries: Vec::new(),
            selected_index: 0,
            expanded: HashSet::new(),
            icons: HashMap::new(),
            progress: Progress::default(),
            currency: settings.currency.clone(),
            currencies: Vec::new(),
            input_buffer: String::new(),
            suggestions: None,
            settings_form: SettingsForm::from_settings(settings),
            status: None,
            busy: None,
        }
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // ========================================================================
    // Watchlist
    // ========================================================================

    /// Remplace la copie de la watchlist
    ///
    /// La sélection suit le ticker sélectionné s'il existe encore, sinon
    /// elle est ramenée dans les bornes.
    pub fn set_entries(&mut self, entries: Vec<WatchEntry>) {
        let selected = self.selected_ticker().map(str::to_string);
        self.entries = entries;

        if let Some(index) = selected
            .and_then(|t| self.entries.iter().position(|e| e.ticker() == t))
        {
            self.selected_index = index;
        }
        let max_index = self.entries.len().saturating_sub(1);
        self.selected_index = self.selected_index.min(max_index);

        let tickers: HashSet<&str> = self.entries.iter().map(|e| e.ticker()).collect();
        self.expanded.retain(|t| tickers.contains(t.as_str()));
    }

    pub fn navigate_up(&mut self) {
        self.selected_index = self.selected_index.saturating_sub(1);
    }

    pub fn navigate_down(&mut self) {
        let max_index = self.entries.len().saturating_sub(1);
        self.selected_index = (self.selected_index + 1).min(max_index);
    }

    pub fn selected_entry(&self) -> Option<&WatchEntry> {
        self.entries.get(self.selected_index)
    }

    pub fn selected_ticker(&self) -> Option<&str> {
        self.selected_entry().map(|e| e.ticker())
    }

    /// Déplie / replie le détail de la ligne sélectionnée
    pub fn toggle_detail(&mut self) {
        if let Some(ticker) = self.selected_ticker().map(str::to_string) {
            if !self.expanded.remove(&ticker) {
                self.expanded.insert(ticker);
            }
        }
    }

    pub fn is_expanded(&self, ticker: &str) -> bool {
        self.expanded.contains(ticker)
    }

    // ========================================================================
    // Icônes
    // ========================================================================

    /// Entrées dont l'icône n'a pas encore été demandée : (ticker, url)
    ///
    /// Les entrées retournées passent à Loading, chaque icône n'est donc
    /// demandée qu'une fois.
    pub fn take_missing_icons(&mut self) -> Vec<(String, String)> {
        let mut missing = Vec::new();
        for entry in &self.entries {
            let ticker = entry.ticker();
            if self.icons.contains_key(ticker) {
                continue;
            }
            match entry.symbol().icon_url.as_deref() {
                Some(url) if !url.is_empty() => {
                    missing.push((ticker.to_string(), url.to_string()));
                }
                _ => {}
            }
        }
        for (ticker, _) in &missing {
            self.icons.insert(ticker.clone(), IconState::Loading);
        }
        missing
    }

    pub fn set_icon(&mut self, ticker: String, color: Option<(u8, u8, u8)>) {
        self.icons.insert(ticker, IconState::Ready(color));
    }

    /// Couleur de l'icône si elle est résolue
    pub fn icon_color(&self, ticker: &str) -> Option<(u8, u8, u8)> {
        match self.icons.get(ticker) {
            Some(IconState::Ready(color)) => *color,
            _ => None,
        }
    }

    // ========================================================================
    // Devise
    // ========================================================================

    pub fn set_currencies(&mut self, currencies: Vec<String>) {
        self.currencies = currencies;
    }

    /// Devise suivante dans la liste du fournisseur (boucle)
    ///
    /// None si la liste est vide ou ne contient que la devise courante.
    pub fn next_currency(&self) -> Option<String> {
        if self.currencies.is_empty() {
            return None;
        }
        let next = match self.currencies.iter().position(|c| *c == self.currency) {
            Some(index) => &self.currencies[(index + 1) % self.currencies.len()],
            None => &self.currencies[0],
        };
        if *next == self.currency {
            None
        } else {
            Some(next.clone())
        }
    }

    // ========================================================================
    // AddCoin
    // ========================================================================

    pub fn start_add(&mut self) {
        self.current_screen = Screen::AddCoin;
        self.input_buffer.clear();
        self.suggestions = None;
    }

    pub fn set_suggestions(&mut self, suggestions: Vec<Symbol>) {
        self.suggestions = Some(suggestions);
    }

    /// Suggestions qui correspondent à la saisie
    ///
    /// Préfixe du ticker ou sous-chaîne du nom, sans tenir compte de la casse.
    pub fn filtered_suggestions(&self) -> Vec<&Symbol> {
        let filter = self.input_buffer.trim().to_lowercase();
        self.suggestions
            .iter()
            .flatten()
            .filter(|s| {
                filter.is_empty()
                    || s.ticker.to_lowercase().starts_with(&filter)
                    || s.name.to_lowercase().contains(&filter)
            })
            .take(MAX_SUGGESTIONS)
            .collect()
    }

    /// Complète la saisie avec la première suggestion ("BTC (Bitcoin)")
    pub fn complete_input(&mut self) {
        if let Some(label) = self.filtered_suggestions().first().map(|s| s.label()) {
            self.input_buffer = label;
        }
    }

    pub fn append_char(&mut self, c: char) {
        match self.current_screen {
            Screen::Settings => self.settings_form.api_key.push(c),
            _ => self.input_buffer.push(c),
        }
    }

    pub fn backspace(&mut self) {
        match self.current_screen {
            Screen::Settings => {
                self.settings_form.api_key.pop();
            }
            _ => {
                self.input_buffer.pop();
            }
        }
    }

    /// Récupère la saisie et retourne au dashboard
    pub fn submit_input(&mut self) -> String {
        let value = std::mem::take(&mut self.input_buffer);
        self.current_screen = Screen::Dashboard;
        value
    }

    // ========================================================================
    // Settings
    // ========================================================================

    pub fn start_settings(&mut self, settings: &Settings) {
        self.settings_form = SettingsForm::from_settings(settings);
        self.current_screen = Screen::Settings;
    }

    /// Valide le formulaire : (clé API, intervalle)
    pub fn submit_settings(&mut self) -> (String, Duration) {
        self.current_screen = Screen::Dashboard;
        (self.settings_form.api_key.trim().to_string(), self.settings_form.interval())
    }

    // ========================================================================
    // Confirmations
    // ========================================================================

    /// Demande une confirmation
    ///
    /// Delete sans entrée sélectionnée est ignoré.
    pub fn request(&mut self, action: PendingAction) {
        if let PendingAction::Delete(ticker) = &action {
            if ticker.is_empty() {
                return;
            }
        }
        self.current_screen = Screen::Confirm(action);
    }

    /// Demande la suppression de l'entrée sélectionnée
    pub fn request_delete(&mut self) {
        if let Some(ticker) = self.selected_ticker().map(str::to_string) {
            self.request(PendingAction::Delete(ticker));
        }
    }

    /// 'y' : retourne l'action confirmée et revient au dashboard
    pub fn confirm(&mut self) -> Option<PendingAction> {
        match std::mem::replace(&mut self.current_screen, Screen::Dashboard) {
            Screen::Confirm(action) => Some(action),
            other => {
                self.current_screen = other;
                None
            }
        }
    }

    /// 'n' / Esc : abandonne l'action en attente ou la saisie
    pub fn cancel(&mut self) {
        self.current_screen = Screen::Dashboard;
        self.input_buffer.clear();
    }

    pub fn pending_action(&self) -> Option<&PendingAction> {
        match &self.current_screen {
            Screen::Confirm(action) => Some(action),
            _ => None,
        }
    }

    pub fn is_on_dashboard(&self) -> bool {
        self.current_screen == Screen::Dashboard
    }

    // ========================================================================
    // Statut
    // ========================================================================

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    pub fn start_loading(&mut self, message: impl Into<String>) {
        self.busy = Some(message.into());
    }

    pub fn stop_loading(&mut self) {
        self.busy = None;
    }

    pub fn set_progress(&mut self, progress: Progress) {
        self.progress = progress;
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================
