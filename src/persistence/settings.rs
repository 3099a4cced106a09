// ============================================================================
// Settings : paramètres utilisateur
// ============================================================================
// Clé API CoinMarketCap, devise d'affichage, intervalle de rafraîchissement.
//
// Fichier config.json :
// {
//   "coinmarketcap_api_key": "...",
//   "currency": "USD",
//   "refresh_interval": 10800        <- secondes
// }
//
// Règles :
// - clé API absente du fichier (ou fichier absent) -> $COINWATCHER_KEY
// - fichier absent ou illisible -> paramètres par défaut (première devise du
//   fournisseur, 3 heures), puis sauvegarde
// ============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::persistence::Storage;

/// Nom du fichier de paramètres
pub const SETTINGS_FILE: &str = "config.json";

/// Variable d'environnement de secours pour la clé API
pub const API_KEY_ENV: &str = "COINWATCHER_KEY";

/// Intervalle par défaut : 3 heures
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3 * 60 * 60);

/// Devise utilisée si le fournisseur est injoignable
pub const FALLBACK_CURRENCY: &str = "USD";

/// Intervalles proposés dans l'écran des paramètres
pub const INTERVAL_OPTIONS: [(&str, Duration); 10] = [
    ("5 Minutes", Duration::from_secs(5 * 60)),
    ("10 Minutes", Duration::from_secs(10 * 60)),
    ("15 Minutes", Duration::from_secs(15 * 60)),
    ("30 Minutes", Duration::from_secs(30 * 60)),
    ("1 Hour", Duration::from_secs(60 * 60)),
    ("2 Hours", Duration::from_secs(2 * 60 * 60)),
    ("4 Hours", Duration::from_secs(4 * 60 * 60)),
    ("8 Hours", Duration::from_secs(8 * 60 * 60)),
    ("12 Hours", Duration::from_secs(12 * 60 * 60)),
    ("24 Hours", Duration::from_secs(24 * 60 * 60)),
];

/// Paramètres de l'application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "coinmarketcap_api_key", default)]
    pub api_key: String,

    #[serde(default)]
    pub currency: String,

    #[serde(rename = "refresh_interval", with = "duration_secs", default = "default_interval")]
    pub refresh_interval: Duration,
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

/// Sérialise une Duration en secondes entières
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

impl Settings {
    /// Paramètres par défaut
    ///
    /// - devise : la première proposée par le fournisseur, sinon USD
    /// - intervalle : 3 heures
    pub fn defaults(api_key: String, currencies: &[String]) -> Self {
        Self {
            api_key,
            currency: currencies
                .first()
                .cloned()
                .unwrap_or_else(|| FALLBACK_CURRENCY.to_string()),
            refresh_interval: DEFAULT_INTERVAL,
        }
    }

    /// Index de l'option d'intervalle à présélectionner
    ///
    /// La plus grande option qui ne dépasse pas l'intervalle courant
    /// (la première si l'intervalle est plus court que toutes).
    pub fn interval_option_index(&self) -> usize {
        INTERVAL_OPTIONS
            .iter()
            .rposition(|(_, d)| self.refresh_interval >= *d)
            .unwrap_or(0)
    }
}

/// Clé API effective : celle du fichier, sinon celle de l'environnement
pub fn resolve_api_key(from_file: Option<&str>, from_env: Option<String>) -> String {
    match from_file {
        Some(key) if !key.trim().is_empty() => key.to_string(),
        _ => from_env.unwrap_or_default(),
    }
}

/// Lit la clé API dans l'environnement
pub fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())
}

/// Charge config.json
///
/// Retourne None si le fichier est absent ou illisible (l'appelant passe
/// alors aux paramètres par défaut). Un intervalle nul est remplacé par
/// l'intervalle par défaut.
pub fn load_settings(storage: &Storage) -> Option<Settings> {
    let bytes = match storage.read(SETTINGS_FILE) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Could not get settings reader");
            return None;
        }
    };

    match serde_json::from_slice::<Settings>(&bytes) {
        Ok(mut settings) => {
            if settings.refresh_interval.is_zero() {
                settings.refresh_interval = DEFAULT_INTERVAL;
            }
            info!(currency = %settings.currency, interval_secs = settings.refresh_interval.as_secs(), "Settings loaded");
            Some(settings)
        }
        Err(e) => {
            error!(error = %e, "Could not decode settings");
            None
        }
    }
}

/// Sauvegarde config.json
pub fn save_settings(storage: &Storage, settings: &Settings) -> Result<()> {
    let data = serde_json::to_vec_pretty(settings).context("Échec de la sérialisation des paramètres")?;
    storage
        .write(SETTINGS_FILE, &data)
        .context("Échec de l'écriture des paramètres")
}
