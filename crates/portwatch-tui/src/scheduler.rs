//! Off-loop backend calls and the periodic refresh timer.
//!
//! Every request is numbered. Replies come back over an mpsc channel tagged
//! with that number so the loop can drop a full snapshot that was overtaken by
//! a newer one. Range-scan merges are idempotent and always applied.

use portwatch_core::{
    KillResult, PortBackend, PortPreset, PortRange, PortRecord, TransportError, ValidationError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

pub type SharedBackend = Arc<dyn PortBackend>;

#[derive(Debug)]
pub enum BackendReply {
    Discovered(Result<Vec<PortRecord>, TransportError>),
    Scanned {
        range: PortRange,
        result: Result<Vec<PortRecord>, TransportError>,
    },
    Terminated {
        pid: u32,
        elevated: bool,
        result: Result<KillResult, TransportError>,
    },
    Presets(Result<Vec<PortPreset>, TransportError>),
}

#[derive(Debug)]
pub struct BackendEvent {
    pub seq: u64,
    pub reply: BackendReply,
}

pub struct RefreshScheduler {
    backend: SharedBackend,
    tx: mpsc::Sender<BackendEvent>,
    next_seq: u64,
    in_flight: usize,
    applied_full_seq: u64,
}

impl RefreshScheduler {
    pub fn new(backend: SharedBackend, tx: mpsc::Sender<BackendEvent>) -> Self {
        Self {
            backend,
            tx,
            next_seq: 0,
            in_flight: 0,
            applied_full_seq: 0,
        }
    }

    /// Discoveries and range scans currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight > 0
    }

    pub fn fetch_all(&mut self) -> u64 {
        self.in_flight += 1;
        let seq = self.bump_seq();
        debug!(event = "fetch_all_dispatched", seq);
        self.dispatch(
            seq,
            "discover_ports",
            |backend| BackendReply::Discovered(backend.discover_ports()),
            |err| BackendReply::Discovered(Err(err)),
        );
        seq
    }

    /// Rejects bounds outside `1..=65535` or inverted before anything is sent.
    pub fn scan_range(&mut self, start: u32, end: u32) -> Result<PortRange, ValidationError> {
        let range = PortRange::new(start, end)?;
        self.scan(range);
        Ok(range)
    }

    pub fn scan(&mut self, range: PortRange) -> u64 {
        self.in_flight += 1;
        let seq = self.bump_seq();
        debug!(event = "scan_range_dispatched", seq, range = %range);
        self.dispatch(
            seq,
            "scan_port_range",
            move |backend| BackendReply::Scanned {
                range,
                result: backend.scan_port_range(range),
            },
            move |err| BackendReply::Scanned {
                range,
                result: Err(err),
            },
        );
        seq
    }

    pub fn terminate(&mut self, pid: u32, elevated: bool) -> u64 {
        let seq = self.bump_seq();
        let operation = if elevated {
            "terminate_process_elevated"
        } else {
            "terminate_process"
        };
        self.dispatch(
            seq,
            operation,
            move |backend| BackendReply::Terminated {
                pid,
                elevated,
                result: if elevated {
                    backend.terminate_process_elevated(pid)
                } else {
                    backend.terminate_process(pid)
                },
            },
            move |err| BackendReply::Terminated {
                pid,
                elevated,
                result: Err(err),
            },
        );
        seq
    }

    pub fn load_presets(&mut self) -> u64 {
        let seq = self.bump_seq();
        self.dispatch(
            seq,
            "list_presets",
            |backend| BackendReply::Presets(backend.list_presets()),
            |err| BackendReply::Presets(Err(err)),
        );
        seq
    }

    /// Books a reply in and says whether the caller should apply it.
    pub fn settle(&mut self, event: &BackendEvent) -> bool {
        match &event.reply {
            BackendReply::Discovered(result) => {
                self.finish_one();
                if event.seq < self.applied_full_seq {
                    debug!(
                        event = "stale_snapshot_dropped",
                        seq = event.seq,
                        applied = self.applied_full_seq
                    );
                    return false;
                }
                if result.is_ok() {
                    self.applied_full_seq = event.seq;
                }
                true
            }
            BackendReply::Scanned { .. } => {
                self.finish_one();
                true
            }
            BackendReply::Terminated { .. } | BackendReply::Presets(_) => true,
        }
    }

    fn finish_one(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn dispatch<F, A>(&self, seq: u64, operation: &'static str, call: F, aborted: A)
    where
        F: FnOnce(&dyn PortBackend) -> BackendReply + Send + 'static,
        A: FnOnce(TransportError) -> BackendReply + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let reply = match tokio::task::spawn_blocking(move || call(backend.as_ref())).await {
                Ok(reply) => reply,
                Err(err) => aborted(TransportError::Aborted {
                    operation,
                    message: err.to_string(),
                }),
            };
            if tx.send(BackendEvent { seq, reply }).await.is_err() {
                debug!(event = "backend_reply_dropped", operation, seq);
            }
        });
    }
}

/// Periodic refresh trigger. Changing the period replaces the schedule
/// instead of adding a second one; pausing parks `tick` forever.
pub struct RefreshTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl RefreshTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: Some(schedule(period)),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_paused(&self) -> bool {
        self.interval.is_none()
    }

    pub fn set_period(&mut self, period: Duration) -> bool {
        if period == self.period {
            return false;
        }
        self.period = period;
        if self.interval.is_some() {
            self.interval = Some(schedule(period));
        }
        true
    }

    pub fn pause(&mut self) -> bool {
        self.interval.take().is_some()
    }

    pub fn resume(&mut self) -> bool {
        if self.interval.is_some() {
            return false;
        }
        self.interval = Some(schedule(self.period));
        true
    }

    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

fn schedule(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
