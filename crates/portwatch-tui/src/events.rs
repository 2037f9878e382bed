use crate::scheduler::BackendEvent;
use crossterm::event::Event;
use serde::{Deserialize, Serialize};

/// Requests arriving from outside the terminal: the control socket or
/// `SIGUSR1`. Wire form is one JSON object per line, e.g.
/// `{"type":"scan_preset","payload":{"preset_id":"web"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundSignal {
    #[serde(rename = "refresh_ports")]
    RefreshRequested,
    #[serde(rename = "scan_preset")]
    ScanPresetRequested { preset_id: String },
    OpenSettings,
}

/// Everything the dispatch loop reacts to. Each one runs to completion before
/// the next is taken.
#[derive(Debug)]
pub enum AppEvent {
    Input(Event),
    /// UI housekeeping (notification expiry, refresh age).
    Tick,
    /// The periodic refresh timer fired.
    RefreshDue,
    Backend(BackendEvent),
    Signal(InboundSignal),
}
