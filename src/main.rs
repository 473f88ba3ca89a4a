use std::{
    fs::OpenOptions,
    io::Stdout,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use crossterm::{
    event::{self, Event as CEvent, KeyEvent, KeyEventKind},
    cursor, execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app;
mod clipboard;
mod config;
mod controller;
mod message;
mod render;
mod ui;

use api::{ApiError, AskClient, AskRequest, HttpAskClient};
use app::App;
use clipboard::SystemClipboard;
use config::{AppConfig, Settings, DEFAULT_LOG_LEVEL};
use controller::ChatController;

// ---------- Events ----------
#[derive(Debug)]
enum AppEvent {
    Tick,
    Input(KeyEvent),
    Answer(Result<String, ApiError>),
}

// ---------- Logging ----------
fn init_tracing(level: &str) -> Result<()> {
    let path = config::data_dir()?.join("gogginsgpt.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("install log subscriber: {e}"))
}

// ---------- Terminal ----------
fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(std::io::stdout(), LeaveAlternateScreen, cursor::Show)?;
    Ok(())
}

/// Puts the terminal back before the default hook prints the panic.
fn install_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = restore_terminal();
        prev_hook(info);
    }));
}

/// Runs `restore` when dropped: on normal exit, on `?` and while unwinding.
struct RestoreGuard<F: FnMut()> {
    restore: F,
}

impl<F: FnMut()> Drop for RestoreGuard<F> {
    fn drop(&mut self) {
        (self.restore)();
    }
}

// ---------- Requests ----------
fn spawn_ask(client: Arc<dyn AskClient>, request: AskRequest, tx: UnboundedSender<AppEvent>) {
    tokio::spawn(async move {
        let result = client.ask(request).await;
        let _ = tx.send(AppEvent::Answer(result));
    });
}

// ---------- Main ----------
#[tokio::main]
async fn main() -> Result<()> {
    let cfg = match config::config_path().and_then(|p| config::load_config(&p)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("warning: {e:#}; using defaults");
            AppConfig::default()
        }
    };
    let settings = Settings::resolve(cfg, |key| std::env::var(key).ok());
    init_tracing(&settings.log_level)?;

    let http = HttpAskClient::new(&settings.api_url);
    info!(url = http.ask_url(), send_context = settings.send_context, "starting");
    let client: Arc<dyn AskClient> = Arc::new(http);
    let mut app = App::new(ChatController::new(settings.send_context, settings.error_display));

    install_panic_hook();
    enable_raw_mode()?;
    let guard = RestoreGuard {
        restore: || {
            if let Err(e) = restore_terminal() {
                error!("restore terminal: {e:#}");
            }
        },
    };
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let (tx, rx): (UnboundedSender<AppEvent>, UnboundedReceiver<AppEvent>) = unbounded_channel();

    let tx_input = tx.clone();
    std::thread::spawn(move || loop {
        if event::poll(Duration::from_millis(250)).unwrap_or(false) {
            if let Ok(CEvent::Key(key)) = event::read() {
                if key.kind == KeyEventKind::Press && tx_input.send(AppEvent::Input(key)).is_err() {
                    break;
                }
            }
        }
    });

    let tx_tick = tx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            if tx_tick.send(AppEvent::Tick).is_err() {
                break;
            }
        }
    });

    let result = run(&mut terminal, &mut app, client, tx, rx).await;

    drop(guard);
    if let Err(e) = &result {
        error!("event loop failed: {e:#}");
    }
    result
}

async fn run(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    client: Arc<dyn AskClient>,
    tx: UnboundedSender<AppEvent>,
    mut rx: UnboundedReceiver<AppEvent>,
) -> Result<()> {
    let mut clipboard = SystemClipboard;
    loop {
        let now = Instant::now();
        terminal.draw(|f| ui::draw_ui(f, app, now))?;
        let Some(ev) = rx.recv().await else { break };
        match ev {
            AppEvent::Tick => app.on_tick(Instant::now()),
            AppEvent::Input(key) => {
                if let Some(request) = app.handle_key(key, &mut clipboard, Instant::now()) {
                    spawn_ask(Arc::clone(&client), request, tx.clone());
                }
            }
            AppEvent::Answer(result) => app.on_answer(result),
        }
        if app.quit {
            break;
        }
    }
    info!("shutting down");
    Ok(())
}
