mod actions;
mod app;
mod ui;
mod util;
mod worker;

use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context as _, Result};
use chrono::Utc;
use clap::Parser;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::actions::{apply_event, execute_action, persist_unread, Action};
use crate::app::App;
use crate::worker::{DashboardEvent, Worker};
use handoff_config::{self as config, BackendConfig};
use handoff_core::domain::AuthSession;
use handoff_core::{Dashboard, ViewFilter};
use handoff_gateway::{AuthClient, Gateway, RealtimeConfig, RealtimeSubscription, RestClient};
use handoff_store::{paths, Store};

const SESSION_REFRESH_MARGIN_SECS: i64 = 60;
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "handoff-tui", version, about = "handoff TUI")]
struct Args {
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    /// View to open first: active | needs-agent | archived | blocked
    #[arg(long)]
    view: Option<String>,
    #[arg(long, short)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let app_config = config::load(args.config.clone()).with_context(|| "load config")?;
    let backend = app_config.require_backend()?.clone();
    if app_config.delivery.webhook_url.is_none() {
        warn!("delivery webhook url is not configured; replies cannot be sent");
    }
    let view = match args.view.as_deref() {
        Some(raw) => ViewFilter::from_str(raw).map_err(|_| {
            anyhow!("invalid view {raw:?}: expected active|needs-agent|archived|blocked")
        })?,
        None => app_config.dashboard.default_view,
    };

    let db_path = paths::resolve_db_path(args.db_path).with_context(|| "resolve database path")?;
    let store =
        Store::open(&db_path).with_context(|| format!("open database {}", db_path.display()))?;
    store.migrate().with_context(|| "run migrations")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .with_context(|| "start async runtime")?;

    let base = RestClient::new(backend.url.clone(), backend.anon_key.clone())?;
    let session = runtime.block_on(restore_session(&store, &AuthClient::new(base.clone())))?;
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut worker = Worker::new(
        runtime.handle().clone(),
        base,
        app_config.delivery.webhook_url.clone(),
        session,
        events_tx,
        app_config.dashboard.history_limit,
    );

    let profile = runtime
        .block_on(worker.gateway().fetch_profile(worker.agent()))
        .with_context(|| "load agent profile")?;
    if profile.as_ref().is_some_and(|profile| profile.needs_password_change) {
        bail!("password change required; run `handoff set-password` first");
    }
    let agent_name = profile
        .as_ref()
        .map(|profile| profile.display_name().to_string())
        .unwrap_or_else(|| worker.agent().to_string());

    let mut dashboard = Dashboard::new(worker.agent().clone(), view);
    dashboard.set_unread(store.unread().load(worker.agent())?);
    let mut app = App::new(dashboard, agent_name);
    app.enqueue(Action::Reload);

    match connect_realtime(&runtime, &backend, &worker) {
        Ok(subscription) => worker.attach_realtime(subscription),
        Err(err) => {
            warn!(error = %err, "realtime unavailable; falling back to periodic reload");
            app.set_error(format!("Live updates unavailable: {err}"));
        }
    }

    let refresh = match app_config.dashboard.refresh_interval_secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    };

    let result = {
        let mut terminal = TerminalGuard::new()?;
        run_app(
            &mut terminal,
            &store,
            &mut app,
            &mut worker,
            &mut events_rx,
            refresh,
        )
    };

    app.dashboard.close();
    if let Err(err) = persist_unread(&mut app, &store) {
        warn!(error = %err, "could not save unread counts");
    }
    worker.close_realtime();
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    info!("dashboard closed");
    result
}

fn run_app(
    terminal: &mut TerminalGuard,
    store: &Store,
    app: &mut App,
    worker: &mut Worker,
    events: &mut UnboundedReceiver<DashboardEvent>,
    refresh: Option<Duration>,
) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let mut last_tick = Instant::now();
    let mut last_reload = Instant::now();

    loop {
        while let Ok(event) = events.try_recv() {
            if let Err(err) = apply_event(app, store, worker, event) {
                app.set_error(err.to_string());
            }
        }

        while let Some(action) = app.next_action() {
            if matches!(action, Action::Reload) {
                last_reload = Instant::now();
            }
            if let Err(err) = execute_action(app, store, worker, action) {
                app.set_error(err.to_string());
            }
        }

        terminal.terminal_mut().draw(|frame| ui::draw(frame, app))?;

        if app.should_quit {
            break;
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) => app.handle_key(key),
                Event::Resize(_, _) => {}
                _ => {}
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
            worker.refresh_if_due();
            if refresh.is_some_and(|period| last_reload.elapsed() >= period) {
                app.enqueue(Action::Reload);
            }
        }
    }

    Ok(())
}

/// Loads the stored session, refreshing it first when it is about to expire.
async fn restore_session(store: &Store, auth: &AuthClient) -> Result<AuthSession> {
    let Some(stored) = store.auth_session().load()? else {
        bail!("not signed in; run `handoff login` first");
    };
    if !stored.expires_within(
        Utc::now(),
        chrono::Duration::seconds(SESSION_REFRESH_MARGIN_SECS),
    ) {
        return Ok(stored);
    }
    debug!(agent = %stored.agent_id(), "access token expiring; refreshing");
    let refreshed = auth
        .refresh(&stored.refresh_token)
        .await
        .with_context(|| "refresh session")?;
    store
        .auth_session()
        .save(Utc::now().timestamp(), &refreshed)?;
    Ok(refreshed)
}

/// Joins the change feed and forwards its events into the dashboard channel.
fn connect_realtime(
    runtime: &Runtime,
    backend: &BackendConfig,
    worker: &Worker,
) -> Result<RealtimeSubscription> {
    let config = RealtimeConfig::new(
        &backend.url,
        &backend.anon_key,
        &worker.session().access_token,
    )?;
    let (tx, mut rx) = mpsc::channel(64);
    let subscription = runtime.block_on(RealtimeSubscription::connect(config, tx))?;
    let events: UnboundedSender<DashboardEvent> = worker.events();
    runtime.spawn(async move {
        while let Some(event) = rx.recv().await {
            if events.send(DashboardEvent::Realtime(event)).is_err() {
                break;
            }
        }
    });
    Ok(subscription)
}

fn init_logging(verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};
    let path = paths::log_path().with_context(|| "resolve log path")?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let original_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let _ = restore_terminal();
            original_hook(info);
        }));

        Ok(Self { terminal })
    }

    fn terminal_mut(&mut self) -> &mut Terminal<CrosstermBackend<Stdout>> {
        &mut self.terminal
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = restore_terminal();
    }
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode()?;
    execute!(io::stdout(), LeaveAlternateScreen)?;
    Ok(())
}
