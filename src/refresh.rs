// ============================================================================
// RefreshLoop : rafraîchissement périodique des cotations
// ============================================================================
// Une tâche tokio se réveille toutes les minutes (timer de vivacité, pas
// l'intervalle configuré) et :
// 1. calcule fraction = temps écoulé depuis la dernière mise à jour / intervalle
// 2. si fraction >= 1 : un cycle de fetch (un seul appel pour toute la
//    watchlist), puis fusion des cotations dans le WatchlistStore
// 3. publie la progression (0..100) pour la barre de l'UI
//
// CONCEPT : Deux états logiques
// - Idle     : en attente du prochain tick
// - Fetching : requête en cours
//
// Pas d'annulation : un cycle lent dont les résultats arrivent après un cycle
// plus récent est appliqué quand même (le dernier qui écrit gagne, par le
// verrou du store). La date de mise à jour est celle de la fin du cycle.
// ============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::api::QuoteProvider;
use crate::persistence::Settings;
use crate::store::WatchlistStore;

/// Période du timer
pub const TICK_PERIOD: Duration = Duration::from_secs(60);

/// Horloge murale (remplaçable dans les tests)
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// État du rafraîchissement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Fetching,
}

/// Valeur observable par l'UI
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Progression vers le prochain rafraîchissement, bornée à 0..=100
    pub percent: f64,

    /// Temps restant avant le prochain rafraîchissement
    pub eta: Duration,

    /// Un cycle de fetch est en cours
    pub fetching: bool,

    /// Fin du dernier cycle de fetch
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            percent: 0.0,
            eta: Duration::ZERO,
            fetching: false,
            last_updated: None,
        }
    }
}

impl Progress {
    /// Libellé de la barre : "ETA 25m"
    pub fn eta_label(&self) -> String {
        format!("ETA {}m", self.eta.as_secs() / 60)
    }
}

/// Fraction brute temps écoulé / intervalle (peut dépasser 1)
///
/// Sans mise à jour précédente, la fraction vaut 1 : le premier tick
/// déclenche un fetch.
pub fn progress_fraction(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> f64 {
    let Some(last) = last_updated else {
        return 1.0;
    };
    if interval.is_zero() {
        return 1.0;
    }

    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    elapsed.as_secs_f64() / interval.as_secs_f64()
}

/// Fraction -> pourcentage borné à 0..=100
pub fn clamp_percent(fraction: f64) -> f64 {
    (fraction * 100.0).clamp(0.0, 100.0)
}

/// Temps restant avant le prochain rafraîchissement
fn remaining(last_updated: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> Duration {
    match last_updated {
        Some(last) => {
            let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
            interval.saturating_sub(elapsed)
        }
        None => Duration::ZERO,
    }
}

/// Contrôleur du rafraîchissement périodique
pub struct RefreshLoop {
    store: Arc<WatchlistStore>,
    provider: Arc<dyn QuoteProvider>,
    settings: Arc<RwLock<Settings>>,
    last_updated: Mutex<Option<DateTime<Utc>>>,
    in_flight: AtomicUsize,
    progress: watch::Sender<Progress>,
    clock: Clock,
}

impl RefreshLoop {
    pub fn new(
        store: Arc<WatchlistStore>,
        provider: Arc<dyn QuoteProvider>,
        settings: Arc<RwLock<Settings>>,
    ) -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self {
            store,
            provider,
            settings,
            last_updated: Mutex::new(None),
            in_flight: AtomicUsize::new(0),
            progress,
            clock: Arc::new(Utc::now),
        }
    }

    /// Remplace l'horloge qui date la fin des cycles
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Observable de progression (lecture non bloquante côté UI)
    pub fn subscribe_progress(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        *self.last_updated.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn state(&self) -> RefreshState {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            RefreshState::Fetching
        } else {
            RefreshState::Idle
        }
    }

    /// Lance la tâche périodique
    ///
    /// Le premier tick est immédiat. La tâche tourne jusqu'à `abort()`.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(period_secs = TICK_PERIOD.as_secs(), "Refresh loop started");
            loop {
                ticker.tick().await;
                this.tick_at((this.clock)()).await;
            }
        })
    }

    /// Un tick du timer
    ///
    /// Retourne true si un cycle de fetch a été déclenché.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> bool {
        let interval = self.interval();
        let mut fraction = progress_fraction(self.last_updated(), now, interval);
        debug!(fraction, "Refresh tick");

        let fetched = fraction >= 1.0;
        if fetched {
            self.fetch_cycle().await;
            fraction = 1.0;
        }

        self.publish(clamp_percent(fraction), now);
        fetched
    }

    /// Rafraîchissement manuel : ignore le temps écoulé
    pub async fn refresh_at(&self, now: DateTime<Utc>) {
        self.fetch_cycle().await;
        self.publish(0.0, now);
    }

    pub async fn refresh_now(&self) {
        self.refresh_at((self.clock)()).await;
    }

    /// Un cycle de fetch
    ///
    /// CONCEPT : Verrou jamais tenu pendant le réseau
    /// - tickers et devise sont copiés avant l'appel
    /// - l'appel réseau se fait sans aucun verrou
    /// - chaque cotation est fusionnée ensuite par update_quote (verrou court)
    ///
    /// La date de fin est enregistrée même si le fournisseur échoue :
    /// pas de nouvel essai avant le prochain tick qualifiant.
    async fn fetch_cycle(&self) {
        let tickers = self.store.tickers();
        let currency = self.currency();

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.progress.send_modify(|p| p.fetching = true);

        if tickers.is_empty() {
            debug!("Watchlist empty, nothing to fetch");
        } else {
            match self.provider.quotes(&currency, &tickers).await {
                Ok(quotes) => {
                    let received = quotes.len();
                    let applied = quotes
                        .into_iter()
                        .filter_map(|q| self.store.update_quote(q))
                        .count();
                    info!(currency = %currency, requested = tickers.len(), received, applied, "Quotes updated");
                }
                Err(e) => {
                    error!(error = %e, currency = %currency, "Could not get quotes");
                }
            }
        }

        let completed = (self.clock)();
        *self.last_updated.lock().unwrap_or_else(|p| p.into_inner()) = Some(completed);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn publish(&self, percent: f64, now: DateTime<Utc>) {
        let last_updated = self.last_updated();
        let progress = Progress {
            percent,
            eta: remaining(last_updated, now, self.interval()),
            fetching: self.state() == RefreshState::Fetching,
            last_updated,
        };
        self.progress.send_replace(progress);
    }

    fn interval(&self) -> Duration {
        self.settings.read().unwrap_or_else(|p| p.into_inner()).refresh_interval
    }

    fn currency(&self) -> String {
        self.settings.read().unwrap_or_else(|p| p.into_inner()).currency.clone()
    }
}

// ============================================================================
// Tests unitaires
// ============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio::sync::Notify;

    use super::*;
    use crate::api::provider::testing::StaticProvider;
    use crate::error::ProviderError;
    use crate::models::{Quote, Symbol, WatchEntry};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn minutes(m: i64) -> chrono::Duration {
        chrono::Duration::minutes(m)
    }

    fn settings(interval_min: u64) -> Arc<RwLock<Settings>> {
        Arc::new(RwLock::new(Settings {
            api_key: "test".to_string(),
            currency: "USD".to_string(),
            refresh_interval: Duration::from_secs(interval_min * 60),
        }))
    }

    /// Horloge réglable à la main
    struct TestClock(Arc<Mutex<DateTime<Utc>>>);

    impl TestClock {
        fn at(time: DateTime<Utc>) -> Self {
            Self(Arc::new(Mutex::new(time)))
        }

        fn set(&self, time: DateTime<Utc>) {
            *self.0.lock().unwrap() = time;
        }

        fn clock(&self) -> Clock {
            let time = Arc::clone(&self.0);
            Arc::new(move || *time.lock().unwrap())
        }
    }

    fn setup(provider: Arc<StaticProvider>, interval_min: u64) -> (Arc<WatchlistStore>, RefreshLoop, TestClock) {
        let store = Arc::new(WatchlistStore::new());
        store.add(Symbol::bare("BTC", "Bitcoin").into());
        store.add(Symbol::bare("ETH", "Ethereum").into());
        let clock = TestClock::at(t0());
        let refresh =
            RefreshLoop::new(Arc::clone(&store), provider, settings(interval_min)).with_clock(clock.clock());
        (store, refresh, clock)
    }

    fn price(store: &WatchlistStore, ticker: &str) -> Option<f64> {
        store.find_by_ticker(ticker)?.1.quote().map(|q| q.price)
    }

    #[test]
    fn test_progress_fraction() {
        let interval = Duration::from_secs(5 * 60);
        assert_eq!(progress_fraction(None, t0(), interval), 1.0);
        assert!((progress_fraction(Some(t0()), t0() + minutes(6), interval) - 1.2).abs() < 1e-9);
        // Horloge qui recule : 0
        assert_eq!(progress_fraction(Some(t0()), t0() - minutes(1), interval), 0.0);
        assert_eq!(clamp_percent(1.2), 100.0);
        assert_eq!(clamp_percent(-0.5), 0.0);
    }

    #[tokio::test]
    async fn test_overdue_tick_fetches_once_and_clamps() {
        let provider = Arc::new(StaticProvider::new());
        let (store, refresh, clock) = setup(Arc::clone(&provider), 5);
        let progress = refresh.subscribe_progress();
        *refresh.last_updated.lock().unwrap() = Some(t0());

        let now = t0() + minutes(6);
        let completed = now + chrono::Duration::seconds(2);
        clock.set(completed);
        assert!(refresh.tick_at(now).await);

        assert_eq!(provider.quote_calls(), 1);
        assert_eq!(provider.requested(), vec![vec!["BTC".to_string(), "ETH".to_string()]]);
        assert_eq!(progress.borrow().percent, 100.0);
        // L'intervalle suivant part de la fin du fetch
        assert_eq!(refresh.last_updated(), Some(completed));
        assert_eq!(progress.borrow().eta, Duration::from_secs(5 * 60));
        assert_eq!(price(&store, "BTC"), Some(43_000.0));
        assert_eq!(price(&store, "ETH"), Some(2_300.0));
    }

    #[tokio::test]
    async fn test_tick_before_interval_only_publishes() {
        let provider = Arc::new(StaticProvider::new());
        let (_store, refresh, _clock) = setup(Arc::clone(&provider), 5);
        let progress = refresh.subscribe_progress();
        *refresh.last_updated.lock().unwrap() = Some(t0());

        assert!(!refresh.tick_at(t0() + minutes(2)).await);
        assert_eq!(provider.quote_calls(), 0);

        let p = progress.borrow().clone();
        assert!((p.percent - 40.0).abs() < 1e-9);
        assert_eq!(p.eta, Duration::from_secs(3 * 60));
        assert_eq!(p.eta_label(), "ETA 3m");
        assert!(!p.fetching);
    }

    #[tokio::test]
    async fn test_first_tick_fetches() {
        let provider = Arc::new(StaticProvider::new());
        let (_store, refresh, _clock) = setup(Arc::clone(&provider), 5);
        assert!(refresh.tick_at(t0()).await);
        assert_eq!(provider.quote_calls(), 1);
    }

    #[tokio::test]
    async fn test_manual_refresh_ignores_elapsed_time() {
        let provider = Arc::new(StaticProvider::new());
        let (store, refresh, clock) = setup(Arc::clone(&provider), 5);
        *refresh.last_updated.lock().unwrap() = Some(t0());

        let now = t0() + chrono::Duration::seconds(30);
        clock.set(now);
        refresh.refresh_at(now).await;

        assert_eq!(provider.quote_calls(), 1);
        assert_eq!(refresh.last_updated(), Some(now));
        assert_eq!(refresh.subscribe_progress().borrow().percent, 0.0);
        assert!(price(&store, "BTC").is_some());
    }

    #[tokio::test]
    async fn test_provider_error_keeps_watchlist_and_records_time() {
        let provider = Arc::new(StaticProvider::new());
        let (store, refresh, _clock) = setup(Arc::clone(&provider), 5);
        provider.set_failing(true);
        let before = store.list();

        assert!(refresh.tick_at(t0()).await);

        assert_eq!(store.list(), before);
        assert_eq!(refresh.last_updated(), Some(t0()));
        // Pas de nouvel essai avant l'intervalle suivant
        assert!(!refresh.tick_at(t0() + minutes(1)).await);
        assert_eq!(provider.quote_calls(), 1);
        assert_eq!(refresh.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_interval_change_only_affects_next_fraction() {
        let provider = Arc::new(StaticProvider::new());
        let store = Arc::new(WatchlistStore::new());
        let settings = settings(5);
        let refresh = RefreshLoop::new(store, provider, Arc::clone(&settings));
        let progress = refresh.subscribe_progress();
        *refresh.last_updated.lock().unwrap() = Some(t0());

        refresh.tick_at(t0() + minutes(2)).await;
        assert!((progress.borrow().percent - 40.0).abs() < 1e-9);

        settings.write().unwrap().refresh_interval = Duration::from_secs(10 * 60);
        assert!((progress.borrow().percent - 40.0).abs() < 1e-9);

        refresh.tick_at(t0() + minutes(2)).await;
        assert!((progress.borrow().percent - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_watchlist_skips_provider() {
        let provider = Arc::new(StaticProvider::new());
        let refresh = RefreshLoop::new(Arc::new(WatchlistStore::new()), provider.clone(), settings(5))
            .with_clock(TestClock::at(t0()).clock());
        refresh.refresh_at(t0()).await;
        assert_eq!(provider.quote_calls(), 0);
        assert_eq!(refresh.last_updated(), Some(t0()));
    }

    /// Fournisseur dont le premier appel reste bloqué jusqu'à `release`
    struct SlowFirstProvider {
        calls: AtomicUsize,
        release: Notify,
    }

    #[async_trait]
    impl QuoteProvider for SlowFirstProvider {
        async fn symbols(&self) -> Result<Vec<Symbol>, ProviderError> {
            Ok(Vec::new())
        }

        async fn currencies(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["USD".to_string()])
        }

        async fn quotes(&self, _currency: &str, _tickers: &[String]) -> Result<Vec<Quote>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                self.release.notified().await;
                Ok(vec![Quote::new(Symbol::bare("BTC", "Bitcoin"), 1.0)])
            } else {
                Ok(vec![Quote::new(Symbol::bare("BTC", "Bitcoin"), 2.0)])
            }
        }
    }

    #[tokio::test]
    async fn test_stale_cycle_is_applied_anyway() {
        let provider = Arc::new(SlowFirstProvider {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
        });
        let store = Arc::new(WatchlistStore::new());
        store.add(WatchEntry::from(Symbol::bare("BTC", "Bitcoin")));
        let clock = TestClock::at(t0());
        let refresh = Arc::new(
            RefreshLoop::new(Arc::clone(&store), provider.clone(), settings(5)).with_clock(clock.clock()),
        );

        // Cycle lent lancé en premier
        let slow = {
            let refresh = Arc::clone(&refresh);
            tokio::spawn(async move { refresh.refresh_at(t0()).await })
        };
        while provider.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(refresh.state(), RefreshState::Fetching);

        // Cycle récent terminé avant
        clock.set(t0() + minutes(1));
        refresh.refresh_at(t0() + minutes(1)).await;
        assert_eq!(price(&store, "BTC"), Some(2.0));
        assert_eq!(refresh.last_updated(), Some(t0() + minutes(1)));

        // Le cycle lent se termine et écrase : le dernier qui écrit gagne,
        // daté de sa fin et non de son départ
        clock.set(t0() + minutes(2));
        provider.release.notify_one();
        slow.await.unwrap();
        assert_eq!(price(&store, "BTC"), Some(1.0));
        assert_eq!(refresh.last_updated(), Some(t0() + minutes(2)));
        assert_eq!(refresh.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_price_change_between_cycles() {
        let provider = Arc::new(StaticProvider::new());
        let (store, refresh, _clock) = setup(Arc::clone(&provider), 5);

        assert!(refresh.tick_at(t0()).await);
        assert_eq!(price(&store, "BTC"), Some(43_000.0));

        provider.set_price("BTC", 44_500.0);
        assert!(!refresh.tick_at(t0() + minutes(4)).await);
        assert_eq!(price(&store, "BTC"), Some(43_000.0));

        assert!(refresh.tick_at(t0() + minutes(5)).await);
        assert_eq!(price(&store, "BTC"), Some(44_500.0));
        assert_eq!(price(&store, "ETH"), Some(2_300.0));
        assert_eq!(provider.quote_calls(), 2);
    }

    /// Fournisseur qui met un peu de temps à répondre
    struct SlowProvider;

    #[async_trait]
    impl QuoteProvider for SlowProvider {
        async fn symbols(&self) -> Result<Vec<Symbol>, ProviderError> {
            Ok(Vec::new())
        }

        async fn currencies(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["USD".to_string()])
        }

        async fn quotes(&self, _currency: &str, _tickers: &[String]) -> Result<Vec<Quote>, ProviderError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(vec![Quote::new(Symbol::bare("BTC", "Bitcoin"), 1.0)])
        }
    }

    #[tokio::test]
    async fn test_last_updated_is_completion_time() {
        let store = Arc::new(WatchlistStore::new());
        store.add(WatchEntry::from(Symbol::bare("BTC", "Bitcoin")));
        let refresh = RefreshLoop::new(store, Arc::new(SlowProvider), settings(5));

        let started = Utc::now();
        refresh.refresh_now().await;

        let last = refresh.last_updated().unwrap();
        assert!(last - started >= chrono::Duration::milliseconds(200));
    }
}
