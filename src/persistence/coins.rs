// ============================================================================
// Watchlist persistée
// ============================================================================
// Fichier coins.json : liste ordonnée de paires {symbol, name}
// {
//   "coins": [ { "symbol": "BTC", "name": "Bitcoin" }, ... ]
// }
//
// L'ordre du fichier est l'ordre d'affichage.
// ============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::{Symbol, WatchEntry};
use crate::persistence::Storage;

/// Nom du fichier de la watchlist
pub const COINS_FILE: &str = "coins.json";

/// Watchlist de démarrage quand rien n'est sauvegardé
pub const STARTER_COINS: [(&str, &str); 4] = [
    ("BTC", "Bitcoin"),
    ("ETH", "Ethereum"),
    ("DOT", "Polkadot"),
    ("ADA", "Cardano"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PersistedCoin {
    symbol: String,
    name: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCoins {
    coins: Vec<PersistedCoin>,
}

/// Symboles "nus" de la watchlist de démarrage
pub fn starter_symbols() -> Vec<Symbol> {
    STARTER_COINS
        .iter()
        .map(|(ticker, name)| Symbol::bare(*ticker, *name))
        .collect()
}

/// Charge coins.json
///
/// Retourne None si le fichier est absent ou illisible : l'appelant utilise
/// alors la watchlist de démarrage.
pub fn load_coins(storage: &Storage) -> Option<Vec<Symbol>> {
    let bytes = match storage.read(COINS_FILE) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "No saved watchlist");
            return None;
        }
    };

    match serde_json::from_slice::<PersistedCoins>(&bytes) {
        Ok(persisted) => {
            info!(coins = persisted.coins.len(), "Saved watchlist loaded");
            Some(
                persisted
                    .coins
                    .into_iter()
                    .map(|c| Symbol::bare(c.symbol, c.name))
                    .collect(),
            )
        }
        Err(e) => {
            warn!(error = %e, "Could not decode saved watchlist");
            None
        }
    }
}

/// Sauvegarde la watchlist (ordre conservé)
pub fn save_coins(storage: &Storage, entries: &[WatchEntry]) -> Result<()> {
    let persisted = PersistedCoins {
        coins: entries
            .iter()
            .map(|e| PersistedCoin {
                symbol: e.symbol().ticker.clone(),
                name: e.symbol().name.clone(),
            })
            .collect(),
    };

    let data = serde_json::to_vec(&persisted).context("Échec de la sérialisation de la watchlist")?;
    storage
        .write(COINS_FILE, &data)
        .context("Échec de l'écriture de la watchlist")?;
    info!(coins = persisted.coins.len(), "Watchlist saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quote;
    use temp_dir::TempDir;

    #[test]
    fn test_round_trip_keeps_order() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        let entries = vec![
            WatchEntry::from(Quote::new(Symbol::new(1, "BTC", "Bitcoin"), 43_000.0)),
            WatchEntry::from(Symbol::new(1027, "ETH", "Ethereum")),
        ];

        save_coins(&storage, &entries).unwrap();
        let loaded = load_coins(&storage).unwrap();

        let tickers: Vec<&str> = loaded.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["BTC", "ETH"]);
        assert_eq!(loaded[1].name, "Ethereum");
    }

    #[test]
    fn test_load_reads_symbol_name_pairs() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        storage
            .write(COINS_FILE, br#"{"coins":[{"symbol":"ADA","name":"Cardano"}]}"#)
            .unwrap();

        let loaded = load_coins(&storage).unwrap();
        assert_eq!(loaded, vec![Symbol::bare("ADA", "Cardano")]);
    }

    #[test]
    fn test_load_missing_or_corrupt() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        assert!(load_coins(&storage).is_none());

        storage.write(COINS_FILE, b"[1, 2").unwrap();
        assert!(load_coins(&storage).is_none());
    }

    #[test]
    fn test_starter_symbols() {
        let starters = starter_symbols();
        assert_eq!(starters.len(), 4);
        assert_eq!(starters[0].ticker, "BTC");
        assert_eq!(starters[3].name, "Cardano");
    }
}
