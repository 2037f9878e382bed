//! Inbound control: newline-delimited JSON over a Unix socket, plus SIGUSR1.

use crate::events::InboundSignal;
use std::io;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub fn parse_control_line(line: &str) -> Option<InboundSignal> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(signal) => Some(signal),
        Err(err) => {
            warn!(event = "control_line_rejected", error = %err);
            None
        }
    }
}

#[cfg(unix)]
pub fn spawn_socket(
    path: PathBuf,
    tx: mpsc::Sender<InboundSignal>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(serve_socket(path, tx, shutdown))
}

#[cfg(not(unix))]
pub fn spawn_socket(
    _path: PathBuf,
    _tx: mpsc::Sender<InboundSignal>,
    _shutdown: watch::Receiver<bool>,
) -> JoinHandle<io::Result<()>> {
    tokio::spawn(async { Ok(()) })
}

#[cfg(unix)]
async fn serve_socket(
    path: PathBuf,
    tx: mpsc::Sender<InboundSignal>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tokio::net::UnixListener;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
    }
    if path.exists() {
        let _ = fs::remove_file(&path);
    }
    let listener = UnixListener::bind(&path)?;
    let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));
    info!(event = "control_socket_start", socket = %path.display());

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accept = listener.accept() => {
                match accept {
                    Ok((stream, _addr)) => {
                        tokio::spawn(read_connection(stream, tx.clone()));
                    }
                    Err(err) => warn!(event = "control_socket_accept_error", error = %err),
                }
            }
        }
    }

    let _ = fs::remove_file(&path);
    info!(event = "control_socket_stop", socket = %path.display());
    Ok(())
}

#[cfg(unix)]
async fn read_connection(stream: tokio::net::UnixStream, tx: mpsc::Sender<InboundSignal>) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(signal) = parse_control_line(&line) {
                    debug!(event = "control_signal", signal = ?signal);
                    if tx.send(signal).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!(event = "control_socket_read_error", error = %err);
                break;
            }
        }
    }
}

/// Forwards SIGUSR1 as a refresh request until shutdown.
#[cfg(unix)]
pub fn spawn_refresh_signal(
    tx: mpsc::Sender<InboundSignal>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = signal(SignalKind::user_defined1())?;
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = usr1.recv() => {
                    if received.is_none() {
                        break;
                    }
                    debug!(event = "sigusr1_refresh");
                    if tx.send(InboundSignal::RefreshRequested).await.is_err() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn spawn_refresh_signal(
    _tx: mpsc::Sender<InboundSignal>,
    _shutdown: watch::Receiver<bool>,
) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async {}))
}
