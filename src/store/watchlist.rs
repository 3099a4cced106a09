// ============================================================================
// WatchlistStore : la watchlist partagée
// ============================================================================
// Collection ordonnée de WatchEntry, unique par ticker, protégée par un seul
// Mutex. Chaque modification émet une notification (broadcast) pour l'UI.
//
// Discipline de verrouillage :
// - toute opération qui modifie ou parcourt la liste prend le verrou pour
//   toute sa durée
// - le verrou n'est JAMAIS tenu pendant un appel réseau : les cotations sont
//   récupérées avant, seul le résultat est stocké sous le verrou
// - aucune référence vers l'intérieur ne sort : on retourne des copies
// ============================================================================

use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::models::{Quote, WatchEntry};

/// Capacité du canal de notifications
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification de changement de la watchlist
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchlistChange {
    /// Entrée ajoutée à la fin, à cet index
    Added(usize),

    /// Entrée supprimée à cet index (les suivantes ont décalé)
    Removed(usize),

    /// Cotation remplacée à cet index
    Updated(usize),

    /// Liste entièrement remplacée (rechargement)
    Reloaded,
}

/// Watchlist thread-safe
pub struct WatchlistStore {
    entries: Mutex<Vec<WatchEntry>>,
    changes: broadcast::Sender<WatchlistChange>,
}

impl WatchlistStore {
    /// Crée une watchlist vide
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// S'abonne aux notifications
    pub fn subscribe(&self) -> broadcast::Receiver<WatchlistChange> {
        self.changes.subscribe()
    }

    /// Ajoute une entrée à la fin
    ///
    /// Retourne false (sans rien faire) si le ticker est déjà suivi.
    pub fn add(&self, entry: WatchEntry) -> bool {
        let index = {
            let mut entries = self.lock();
            if entries.iter().any(|e| e.ticker() == entry.ticker()) {
                debug!(ticker = %entry.ticker(), "Symbol already watched, ignored");
                return false;
            }
            info!(ticker = %entry.ticker(), "Adding symbol to watchlist");
            entries.push(entry);
            entries.len() - 1
        };

        self.notify(WatchlistChange::Added(index));
        true
    }

    /// Supprime l'entrée d'un ticker
    ///
    /// Retourne false si le ticker n'est pas suivi. L'ordre des entrées
    /// restantes est conservé.
    pub fn remove(&self, ticker: &str) -> bool {
        let index = {
            let mut entries = self.lock();
            match entries.iter().position(|e| e.ticker() == ticker) {
                Some(index) => {
                    entries.remove(index);
                    index
                }
                None => return false,
            }
        };

        info!(ticker = %ticker, index, "Symbol removed from watchlist");
        self.notify(WatchlistChange::Removed(index));
        true
    }

    /// Remplace la cotation de l'entrée du même ticker
    ///
    /// CONCEPT : Remplacement atomique
    /// - L'entrée entière est échangée sous le verrou
    /// - Un lecteur voit l'ancienne ou la nouvelle cotation, jamais un mélange
    ///
    /// Retourne l'index mis à jour, None si le ticker n'est pas suivi ou si
    /// la cotation est incohérente (loguée et ignorée).
    pub fn update_quote(&self, quote: Quote) -> Option<usize> {
        let index = {
            let mut entries = self.lock();
            let index = entries.iter().position(|e| e.ticker() == quote.ticker())?;

            match entries[index].apply_quote(quote) {
                Ok(updated) => {
                    entries[index] = updated;
                    index
                }
                Err(e) => {
                    error!(error = %e, "Failed to update");
                    return None;
                }
            }
        };

        self.notify(WatchlistChange::Updated(index));
        Some(index)
    }

    /// Remplace toute la liste (rechargement)
    ///
    /// Les doublons de ticker sont ignorés, la première occurrence gagne.
    pub fn replace_all(&self, new_entries: Vec<WatchEntry>) {
        {
            let mut entries = self.lock();
            entries.clear();
            for entry in new_entries {
                if !entries.iter().any(|e| e.ticker() == entry.ticker()) {
                    entries.push(entry);
                }
            }
            info!(count = entries.len(), "Watchlist reloaded");
        }
        self.notify(WatchlistChange::Reloaded);
    }

    /// Copie ordonnée des entrées
    pub fn list(&self) -> Vec<WatchEntry> {
        self.lock().clone()
    }

    /// Tickers suivis, dans l'ordre
    pub fn tickers(&self) -> Vec<String> {
        self.lock().iter().map(|e| e.ticker().to_string()).collect()
    }

    /// Recherche linéaire par ticker (la watchlist compte quelques dizaines
    /// d'entrées)
    pub fn find_by_ticker(&self, ticker: &str) -> Option<(usize, WatchEntry)> {
        self.lock()
            .iter()
            .enumerate()
            .find(|(_, e)| e.ticker() == ticker)
            .map(|(i, e)| (i, e.clone()))
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.lock().iter().any(|e| e.ticker() == ticker)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prend le verrou
    ///
    /// Un Mutex empoisonné (panic d'un autre thread) est récupéré : la liste
    /// reste valide puisque chaque modification est un échange complet.
    fn lock(&self) -> MutexGuard<'_, Vec<WatchEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Émet une notification (hors verrou). Sans abonné, l'envoi échoue
    /// silencieusement.
    fn notify(&self, change: WatchlistChange) {
        let _ = self.changes.send(change);
    }
}

impl Default for WatchlistStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Symbol;

    fn symbol(ticker: &str) -> Symbol {
        Symbol::bare(ticker, format!("{} coin", ticker))
    }

    fn store_with(tickers: &[&str]) -> WatchlistStore {
        let store = WatchlistStore::new();
        for t in tickers {
            assert!(store.add(symbol(t).into()));
        }
        store
    }

    #[test]
    fn test_add_appends_in_order() {
        let store = store_with(&["BTC", "ETH", "ADA"]);
        assert_eq!(store.tickers(), vec!["BTC", "ETH", "ADA"]);
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let store = store_with(&["BTC"]);
        let before = store.list();

        assert!(!store.add(symbol("BTC").into()));
        assert_eq!(store.list(), before);
    }

    #[test]
    fn test_uniqueness_under_mixed_operations() {
        let store = WatchlistStore::new();
        let ops = [
            ("add", "BTC"), ("add", "ETH"), ("add", "BTC"), ("remove", "BTC"),
            ("add", "BTC"), ("add", "ETH"), ("remove", "XRP"), ("add", "ADA"),
            ("add", "ADA"), ("remove", "ETH"), ("add", "ETH"), ("add", "BTC"),
        ];

        for (op, ticker) in ops {
            match op {
                "add" => {
                    store.add(symbol(ticker).into());
                }
                _ => {
                    store.remove(ticker);
                }
            }
            let mut tickers = store.tickers();
            let total = tickers.len();
            tickers.sort();
            tickers.dedup();
            assert_eq!(tickers.len(), total, "duplicate after {} {}", op, ticker);
        }

        assert_eq!(store.tickers(), vec!["BTC", "ADA", "ETH"]);
    }

    #[test]
    fn test_remove_preserves_order() {
        let store = store_with(&["BTC", "ETH", "DOT", "ADA"]);
        assert!(store.remove("ETH"));
        assert_eq!(store.tickers(), vec!["BTC", "DOT", "ADA"]);

        assert!(!store.remove("ETH"));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_update_quote_replaces_only_matching_index() {
        let store = store_with(&["BTC", "ETH", "ADA"]);
        let before = store.list();

        let quote = Quote::new(Symbol::new(1027, "ETH", "Ethereum"), 2_300.0);
        assert_eq!(store.update_quote(quote.clone()), Some(1));

        let after = store.list();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[1], WatchEntry::Quoted(quote));
        assert_eq!(after[2], before[2]);
    }

    #[test]
    fn test_update_quote_unknown_ticker_is_noop() {
        let store = store_with(&["BTC"]);
        let before = store.list();

        let quote = Quote::new(Symbol::new(5426, "SOL", "Solana"), 98.0);
        assert_eq!(store.update_quote(quote), None);
        assert_eq!(store.list(), before);
    }

    #[test]
    fn test_find_by_ticker() {
        let store = store_with(&["BTC", "ETH"]);
        let (index, entry) = store.find_by_ticker("ETH").unwrap();
        assert_eq!(index, 1);
        assert_eq!(entry.ticker(), "ETH");
        assert!(store.find_by_ticker("DOGE").is_none());
        assert!(store.contains("BTC"));
    }

    #[test]
    fn test_replace_all_drops_duplicates() {
        let store = store_with(&["SOL"]);
        store.replace_all(vec![symbol("BTC").into(), symbol("ETH").into(), symbol("BTC").into()]);
        assert_eq!(store.tickers(), vec!["BTC", "ETH"]);
    }

    #[test]
    fn test_notifications() {
        let store = WatchlistStore::new();
        let mut rx = store.subscribe();

        store.add(symbol("BTC").into());
        store.add(symbol("ETH").into());
        store.add(symbol("ETH").into()); // doublon : pas de notification
        store.update_quote(Quote::new(symbol("ETH"), 1.0));
        store.remove("BTC");
        store.replace_all(Vec::new());

        assert_eq!(rx.try_recv().unwrap(), WatchlistChange::Added(0));
        assert_eq!(rx.try_recv().unwrap(), WatchlistChange::Added(1));
        assert_eq!(rx.try_recv().unwrap(), WatchlistChange::Updated(1));
        assert_eq!(rx.try_recv().unwrap(), WatchlistChange::Removed(0));
        assert_eq!(rx.try_recv().unwrap(), WatchlistChange::Reloaded);
        assert!(rx.try_recv().is_err());
    }
}
