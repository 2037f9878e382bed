mod app;
mod config;
mod control;
mod events;
mod scheduler;
mod theme;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{
        DisableBracketedPaste, DisableFocusChange, DisableMouseCapture, EnableBracketedPaste,
        EnableFocusChange, EnableMouseCapture, EventStream,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use events::{AppEvent, InboundSignal};
use futures_util::StreamExt;
use portwatch_core::PortView;
use portwatch_procfs::ProcfsBackend;
use ratatui::{backend::CrosstermBackend, Terminal};
use scheduler::{BackendEvent, RefreshScheduler, SharedBackend};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const BACKEND_QUEUE_CAPACITY: usize = 64;
const CONTROL_QUEUE_CAPACITY: usize = 16;
const UI_TICK: Duration = Duration::from_secs(1);

type Term = Terminal<CrosstermBackend<io::Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let config = config::load_config(&cli)?;
    config::init_logging();

    let backend: SharedBackend = Arc::new(ProcfsBackend::new());
    if config.dump {
        return dump(&config, backend).await;
    }
    run_tui(config, backend).await
}

/// One discovery, the CLI criteria applied, one JSON object per line.
async fn dump(config: &config::Config, backend: SharedBackend) -> Result<()> {
    let records = tokio::task::spawn_blocking(move || backend.discover_ports())
        .await
        .context("Discovery task failed")??;

    let mut view = PortView::new(config.sort);
    view.set_snapshot(records);
    view.set_search(config.search.clone());
    let mut filters = *view.criteria().filters();
    filters.protocol = config.protocol;
    view.set_filters(filters);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in view.view().iter() {
        writeln!(out, "{}", serde_json::to_string(record)?)?;
    }
    out.flush()?;
    Ok(())
}

async fn run_tui(config: config::Config, backend: SharedBackend) -> Result<()> {
    let (backend_tx, mut backend_rx) = mpsc::channel(BACKEND_QUEUE_CAPACITY);
    let (control_tx, mut control_rx) = mpsc::channel(CONTROL_QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let socket_task = config
        .control_socket
        .clone()
        .map(|path| control::spawn_socket(path, control_tx.clone(), shutdown_rx.clone()));
    let signal_task = match control::spawn_refresh_signal(control_tx.clone(), shutdown_rx) {
        Ok(task) => Some(task),
        Err(err) => {
            warn!(event = "sigusr1_unavailable", error = %err);
            None
        }
    };
    drop(control_tx);

    let mut app = app::App::new(&config, RefreshScheduler::new(backend, backend_tx));
    app.start();
    info!(
        event = "portwatch_start",
        interval_ms = config.settings.refresh_interval_ms,
        control_socket = config.control_socket.is_some()
    );

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &mut app, &mut backend_rx, &mut control_rx).await;
    restore_terminal(&mut terminal)?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = socket_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(event = "control_socket_error", error = %err),
            Err(err) => warn!(event = "control_socket_join_error", error = %err),
        }
    }
    if let Some(task) = signal_task {
        let _ = task.await;
    }

    if let Err(err) = &result {
        eprintln!("portwatch: {err:#}");
    }
    result
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableFocusChange,
        EnableBracketedPaste
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableFocusChange,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_app(
    terminal: &mut Term,
    app: &mut app::App,
    backend_rx: &mut mpsc::Receiver<BackendEvent>,
    control_rx: &mut mpsc::Receiver<InboundSignal>,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut ui_ticker = tokio::time::interval(UI_TICK);
    ui_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if app.take_dirty() {
            terminal.draw(|frame| ui::render(frame, app))?;
        }

        let event = tokio::select! {
            _ = app.timer.tick() => AppEvent::RefreshDue,
            _ = ui_ticker.tick() => AppEvent::Tick,
            Some(event) = backend_rx.recv() => AppEvent::Backend(event),
            Some(signal) = control_rx.recv() => AppEvent::Signal(signal),
            maybe_event = events.next() => match maybe_event {
                Some(Ok(event)) => AppEvent::Input(event),
                Some(Err(err)) => return Err(err).context("Failed to read terminal input"),
                None => break,
            },
        };
        app.dispatch(event);

        if app.should_quit() {
            break;
        }
    }

    Ok(())
}
