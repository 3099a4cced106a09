// ============================================================================
// CoinWatcher - Watchlist de cryptomonnaies dans le terminal
// ============================================================================
// Démarrage :
//   1. .env + logging vers fichier
//   2. AppContext::bootstrap : paramètres, watchlist, premier fetch groupé
//   3. timer de rafraîchissement (tâche tokio)
//   4. worker en arrière-plan pour les opérations réseau déclenchées par l'UI
//   5. event loop : résultats -> notifications -> render -> input
// ============================================================================

use std::io;
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use coinwatcher::app::{App, PendingAction, Screen};
use coinwatcher::cache::{average_rgb, placeholder, Bitmap};
use coinwatcher::context::AppContext;
use coinwatcher::error::ProviderError;
use coinwatcher::models::{parse_ticker_input, Symbol};
use coinwatcher::persistence::Storage;
use coinwatcher::refresh::Progress;
use coinwatcher::store::WatchlistChange;
use coinwatcher::ui::events::{self, Event, EventHandler};
use coinwatcher::ui::render;

// ============================================================================
// AppCommand / AppResult : dialogue avec le worker
// ============================================================================

/// Commandes envoyées au worker
#[derive(Debug, Clone)]
enum AppCommand {
    /// Ajouter un coin à partir de la saisie ("btc" ou "BTC (Bitcoin)")
    AddTicker { input: String },
    Remove { ticker: String },
    Refresh,
    SetCurrency { code: String },
    UpdateSettings { api_key: String, interval: std::time::Duration },
    Save,
    Reload,
    LoadSuggestions,
    LoadCurrencies,
    ResolveIcon { ticker: String, url: String },
}

/// Résultats renvoyés par le worker
#[derive(Debug)]
enum AppResult {
    Added { ticker: String },
    AlreadyWatched { ticker: String },
    Removed { ticker: String },
    Refreshed,
    CurrencyChanged { code: String },
    SettingsSaved,
    Saved,
    Reloaded,
    Suggestions(Vec<Symbol>),
    Currencies(Vec<String>),
    IconResolved { ticker: String, color: Option<(u8, u8, u8)> },

    /// Échec à afficher dans le header
    Failed(String),
}

// ============================================================================
// Initialisation du logging
// ============================================================================

/// Initialise le logging vers <données>/logs/coinwatcher.log
///
/// Rotation quotidienne. Niveau contrôlé par RUST_LOG, par défaut debug pour
/// coinwatcher et info pour les dépendances.
///
/// ```bash
/// tail -f ~/.local/share/coinwatcher/logs/coinwatcher.log
/// RUST_LOG=coinwatcher=trace cargo run
/// ```
fn init_logging(data_dir: &Path) -> Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).context("Échec de la création du répertoire de logs")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir.clone(), "coinwatcher.log");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coinwatcher=debug,info".into()),
        )
        .init();

    info!(?log_dir, "Logging initialisé");
    Ok(())
}

// ============================================================================
// Point d'entrée
// ============================================================================

fn main() -> Result<()> {
    // COINWATCHER_KEY peut venir d'un fichier .env
    dotenv::dotenv().ok();

    let storage = Storage::from_env();
    init_logging(storage.root()).unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to initialize logging: {}", e);
        eprintln!("   Continuing without logging...");
    });

    info!(data_dir = ?storage.root(), "CoinWatcher starting up");
    println!("📊 Loading watchlist...");

    let runtime = tokio::runtime::Runtime::new().context("Échec de la création du runtime tokio")?;
    let ctx = Arc::new(runtime.block_on(AppContext::bootstrap(storage))?);

    // Le timer tourne sur le runtime principal
    let refresh_task = {
        let _guard = runtime.enter();
        ctx.refresh_loop().spawn()
    };

    let mut app = App::new(&ctx.settings());
    app.set_entries(ctx.store().list());
    let app = Arc::new(Mutex::new(app));

    let (command_tx, command_rx) = mpsc::channel::<AppCommand>();
    let (result_tx, result_rx) = mpsc::channel::<AppResult>();

    info!("Spawning background worker thread");
    let worker = spawn_background_worker(
        command_rx,
        result_tx,
        Arc::clone(&app),
        Arc::clone(&ctx),
        runtime.handle().clone(),
    );
    let _ = command_tx.send(AppCommand::LoadCurrencies);

    debug!("Setting up terminal");
    let mut terminal = setup_terminal()?;

    let channels = Channels {
        commands: command_tx,
        results: result_rx,
        changes: ctx.subscribe(),
        progress: ctx.progress(),
    };

    info!("Starting event loop");
    let result = run(&mut terminal, &app, &ctx, channels, &EventHandler::new());

    debug!("Restoring terminal");
    restore_terminal(&mut terminal)?;

    // Le sender est tombé avec `channels` : le worker sort de sa boucle
    refresh_task.abort();
    if worker.join().is_err() {
        error!("Worker thread panicked");
    }

    match &result {
        Ok(_) => info!("Application exited normally"),
        Err(e) => error!(error = ?e, "Application exited with error"),
    }

    result
}

/// Verrouille l'état de l'UI (un Mutex empoisonné est récupéré)
fn lock(app: &Mutex<App>) -> MutexGuard<'_, App> {
    app.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Background Worker
// ============================================================================
// Thread séparé qui exécute les opérations async du contexte sur le runtime
// principal (Handle::block_on). L'UI continue de tourner pendant ce temps.
// Les icônes sont résolues en tâches indépendantes pour ne pas retarder les
// autres commandes.
// ============================================================================

fn spawn_background_worker(
    command_rx: mpsc::Receiver<AppCommand>,
    result_tx: mpsc::Sender<AppResult>,
    app: Arc<Mutex<App>>,
    ctx: Arc<AppContext>,
    handle: Handle,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(command) = command_rx.recv() {
            debug!(?command, "Worker received command");

            if matches!(command, AppCommand::ResolveIcon { .. }) {
                let ctx = Arc::clone(&ctx);
                let result_tx = result_tx.clone();
                handle.spawn(async move {
                    let result = execute(&ctx, command).await;
                    let _ = result_tx.send(result);
                });
                continue;
            }

            if let Some(message) = loading_message(&command) {
                lock(&app).start_loading(message);
            }

            let result = handle.block_on(execute(&ctx, command));

            lock(&app).stop_loading();
            if result_tx.send(result).is_err() {
                break;
            }
        }
        info!("Worker thread exiting (channel closed)");
    })
}

/// Couleur de la pastille : None pour l'image de remplacement
fn icon_color(bitmap: &Bitmap) -> Option<(u8, u8, u8)> {
    if *bitmap == placeholder() {
        None
    } else {
        average_rgb(bitmap)
    }
}

/// Message affiché pendant une commande (None : commande rapide)
fn loading_message(command: &AppCommand) -> Option<String> {
    match command {
        AppCommand::AddTicker { input } => Some(format!("Adding {}...", input.trim())),
        AppCommand::Refresh => Some("Refreshing...".to_string()),
        AppCommand::SetCurrency { code } => Some(format!("Switching to {}...", code)),
        AppCommand::Reload => Some("Reloading watchlist...".to_string()),
        AppCommand::LoadSuggestions => Some("Loading catalog...".to_string()),
        _ => None,
    }
}

/// Exécute une commande sur le contexte
async fn execute(ctx: &AppContext, command: AppCommand) -> AppResult {
    match command {
        AppCommand::AddTicker { input } => match ctx.add_ticker(&input).await {
            Ok(true) => AppResult::Added { ticker: parse_ticker_input(&input).unwrap_or(input) },
            Ok(false) => AppResult::AlreadyWatched { ticker: parse_ticker_input(&input).unwrap_or(input) },
            Err(ProviderError::UnknownSymbol(ticker)) => {
                warn!(ticker = %ticker, "Unknown symbol");
                AppResult::Failed(format!("Unknown coin: {}", ticker))
            }
            Err(e) => {
                error!(error = %e, "Failed to add symbol");
                AppResult::Failed(format!("Not connected to CoinMarketCap ({})", e))
            }
        },

        AppCommand::Remove { ticker } => {
            if ctx.remove_symbol(&ticker) {
                AppResult::Removed { ticker }
            } else {
                AppResult::Failed(format!("{} is not in the watchlist", ticker))
            }
        }

        AppCommand::Refresh => {
            ctx.refresh_now().await;
            AppResult::Refreshed
        }

        AppCommand::SetCurrency { code } => {
            ctx.set_currency(&code).await;
            AppResult::CurrencyChanged { code }
        }

        AppCommand::UpdateSettings { api_key, interval } => {
            ctx.update_settings(&api_key, interval).await;
            AppResult::SettingsSaved
        }

        AppCommand::Save => match ctx.save_watchlist().await {
            Ok(()) => AppResult::Saved,
            Err(e) => {
                error!(error = ?e, "Failed to save watchlist");
                AppResult::Failed(format!("Save failed: {}", e))
            }
        },

        AppCommand::Reload => {
            ctx.reload_watchlist().await;
            AppResult::Reloaded
        }

        AppCommand::LoadSuggestions => match ctx.symbol_suggestions("").await {
            Ok(symbols) => AppResult::Suggestions(symbols),
            Err(e) => {
                warn!(error = %e, "Catalog unavailable");
                AppResult::Failed("Not connected to CoinMarketCap".to_string())
            }
        },

        AppCommand::LoadCurrencies => match ctx.currencies().await {
            Ok(currencies) => AppResult::Currencies(currencies),
            Err(e) => {
                warn!(error = %e, "Could not get currency list");
                AppResult::Currencies(Vec::new())
            }
        },

        AppCommand::ResolveIcon { ticker, url } => {
            let bitmap = ctx.resolve_icon(&url).await;
            AppResult::IconResolved { ticker, color: icon_color(&bitmap) }
        }
    }
}

// ============================================================================
// Event Loop Principal
// ============================================================================

/// Canaux lus ou écrits par l'event loop
struct Channels {
    commands: mpsc::Sender<AppCommand>,
    results: mpsc::Receiver<AppResult>,
    changes: broadcast::Receiver<WatchlistChange>,
    progress: watch::Receiver<Progress>,
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &Mutex<App>,
    ctx: &AppContext,
    mut channels: Channels,
    events: &EventHandler,
) -> Result<()> {
    while lock(app).is_running() {
        // 0. Résultats du worker
        loop {
            match channels.results.try_recv() {
                Ok(result) => apply_result(&mut lock(app), result),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    error!("Worker thread disconnected!");
                    break;
                }
            }
        }

        // 1. Notifications de la watchlist et progression
        if drain_changes(&mut channels.changes) {
            lock(app).set_entries(ctx.store().list());
        }
        let progress = channels.progress.borrow().clone();
        let missing_icons = {
            let mut app_lock = lock(app);
            app_lock.set_progress(progress);
            app_lock.take_missing_icons()
        };
        for (ticker, url) in missing_icons {
            let _ = channels.commands.send(AppCommand::ResolveIcon { ticker, url });
        }

        // 2. Render
        terminal.draw(|frame| render(frame, &lock(app)))?;

        // 3. Input
        match events.next() {
            Ok(event) => handle_event(&mut lock(app), event, ctx, &channels.commands),
            Err(e) => warn!(error = %e, "Failed to read terminal event"),
        }
    }

    Ok(())
}

/// Vide le canal de notifications, true si la watchlist a changé
///
/// Un retard (Lagged) compte comme un changement : on relit tout.
fn drain_changes(changes: &mut broadcast::Receiver<WatchlistChange>) -> bool {
    let mut changed = false;
    loop {
        match changes.try_recv() {
            Ok(change) => {
                debug!(?change, "Watchlist changed");
                changed = true;
            }
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                debug!(skipped, "Watchlist notifications lagged");
                changed = true;
            }
            Err(_) => return changed,
        }
    }
}

/// Applique un résultat du worker à l'état de l'UI
fn apply_result(app: &mut App, result: AppResult) {
    match result {
        AppResult::Added { ticker } => app.set_status(format!("{} added", ticker)),
        AppResult::AlreadyWatched { ticker } => app.set_status(format!("{} is already watched", ticker)),
        AppResult::Removed { ticker } => app.set_status(format!("{} removed", ticker)),
        AppResult::Refreshed => app.clear_status(),
        AppResult::CurrencyChanged { code } => {
            app.currency = code;
            app.clear_status();
        }
        AppResult::SettingsSaved => app.set_status("Settings saved"),
        AppResult::Saved => app.set_status("Watchlist saved"),
        AppResult::Reloaded => app.set_status("Watchlist reloaded"),
        AppResult::Suggestions(symbols) => app.set_suggestions(symbols),
        AppResult::Currencies(currencies) => app.set_currencies(currencies),
        AppResult::IconResolved { ticker, color } => app.set_icon(ticker, color),
        AppResult::Failed(message) => {
            // La popup de suggestions attendrait indéfiniment
            if app.current_screen == Screen::AddCoin && app.suggestions.is_none() {
                app.set_suggestions(Vec::new());
            }
            app.set_status(message);
        }
    }
}

// ============================================================================
// Gestion des événements
// ============================================================================

fn handle_event(app: &mut App, event: Event, ctx: &AppContext, command_tx: &mpsc::Sender<AppCommand>) {
    if let Event::Tick = event {
        return;
    }
    if events::is_interrupt_event(&event) {
        info!("User interrupted");
        app.quit();
        return;
    }

    let send = |command: AppCommand| {
        if command_tx.send(command).is_err() {
            error!("Worker is gone, command dropped");
        }
    };

    match app.current_screen.clone() {
        Screen::Confirm(_) => {
            if events::is_yes_event(&event) {
                match app.confirm() {
                    Some(PendingAction::Delete(ticker)) => {
                        info!(ticker = %ticker, "User confirmed delete");
                        send(AppCommand::Remove { ticker });
                    }
                    Some(PendingAction::Save) => send(AppCommand::Save),
                    Some(PendingAction::Reload) => send(AppCommand::Reload),
                    Some(PendingAction::Quit) => {
                        info!("User confirmed quit");
                        app.quit();
                    }
                    None => {}
                }
            } else if events::is_no_event(&event) {
                debug!("User cancelled pending action");
                app.cancel();
            }
        }

        Screen::AddCoin => {
            if events::is_escape_event(&event) {
                app.cancel();
            } else if events::is_enter_event(&event) {
                let input = app.submit_input();
                if input.trim().is_empty() {
                    debug!("Empty input, ignoring");
                } else {
                    info!(input = %input, "User submitted coin");
                    send(AppCommand::AddTicker { input });
                }
            } else if events::is_tab_event(&event) {
                app.complete_input();
            } else if events::is_backspace_event(&event) {
                app.backspace();
            } else if let Some(c) = events::get_char_from_event(&event).filter(|_| events::is_text_char_event(&event)) {
                app.append_char(c);
            }
        }

        Screen::Settings => {
            if events::is_escape_event(&event) {
                app.cancel();
            } else if events::is_enter_event(&event) {
                let (api_key, interval) = app.submit_settings();
                send(AppCommand::UpdateSettings { api_key, interval });
            } else if events::is_left_event(&event) {
                app.settings_form.previous_interval();
            } else if events::is_right_event(&event) {
                app.settings_form.next_interval();
            } else if events::is_backspace_event(&event) {
                app.backspace();
            } else if let Some(c) = events::get_char_from_event(&event).filter(|_| events::is_text_char_event(&event)) {
                app.append_char(c);
            }
        }

        Screen::Dashboard => {
            app.clear_status();

            if events::is_quit_event(&event) {
                app.request(PendingAction::Quit);
            } else if events::is_up_event(&event) {
                app.navigate_up();
            } else if events::is_down_event(&event) {
                app.navigate_down();
            } else if events::is_detail_event(&event) {
                app.toggle_detail();
            } else if events::is_add_event(&event) {
                app.start_add();
                send(AppCommand::LoadSuggestions);
            } else if events::is_delete_event(&event) {
                app.request_delete();
            } else if events::is_refresh_event(&event) {
                send(AppCommand::Refresh);
            } else if events::is_currency_event(&event) {
                match app.next_currency() {
                    Some(code) => send(AppCommand::SetCurrency { code }),
                    None => app.set_status("No other currency available"),
                }
            } else if events::is_save_event(&event) {
                app.request(PendingAction::Save);
            } else if events::is_reload_event(&event) {
                app.request(PendingAction::Reload);
            } else if events::is_settings_event(&event) {
                app.start_settings(&ctx.settings());
            }
        }
    }
}

// ============================================================================
// Setup et restauration du terminal
// ============================================================================

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    Terminal::new(CrosstermBackend::new(stdout)).map_err(|e| e.into())
}

/// Restaure le terminal, appelé même si l'event loop a échoué
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}
