use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod backend;
pub mod criteria;
pub mod error;
pub mod pipeline;
pub mod presets;
pub mod settings;
pub mod store;
pub mod window;

pub use backend::PortBackend;
pub use criteria::{
    CriteriaStore, FilterCriteria, ProtocolFilter, SortColumn, SortDirection, SortSpec,
    StateFilter, UserFilter,
};
pub use error::{TransportError, ValidationError};
pub use presets::{builtin_presets, preset_scan_ranges, PresetCatalog};
pub use settings::{AppSettings, SettingsError};
pub use store::{DerivedView, PortView, RecordStore, ViewChange};
pub use window::{compute_visible_range, Viewport, VisibleRange};

pub const MIN_PORT: u32 = 1;
pub const MAX_PORT: u32 = 65_535;

/// One bound or listening socket and the process that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRecord {
    pub pid: u32,
    pub process_name: String,
    pub port: u16,
    pub protocol: Protocol,
    pub address: String,
    pub user: String,
}

/// The (port, protocol, pid) triple used to merge records across scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub port: u16,
    pub protocol: Protocol,
    pub pid: u32,
}

impl PortRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey {
            port: self.port,
            protocol: self.protocol,
            pid: self.pid,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("Unknown protocol: {other}")),
        }
    }
}

/// Inclusive port interval. Construct through [`PortRange::new`] to get the
/// `1 <= start <= end <= 65535` check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u32, end: u32) -> Result<Self, ValidationError> {
        if !(MIN_PORT..=MAX_PORT).contains(&start) || !(MIN_PORT..=MAX_PORT).contains(&end) {
            return Err(ValidationError::PortOutOfRange { start, end });
        }
        if start > end {
            return Err(ValidationError::StartAfterEnd { start, end });
        }
        Ok(Self {
            start: start as u16,
            end: end as u16,
        })
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Parses `"3000-3010"`, `"3000 3010"` or a single `"8080"`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let (start, end) = parse_bounds(input)?;
        Self::new(start, end)
    }
}

/// Splits range text into raw bounds without checking them against the port
/// space, so callers can hand them to a validating entry point.
pub fn parse_bounds(input: &str) -> Result<(u32, u32), ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let parts: Vec<&str> = trimmed
        .split(|ch: char| ch == '-' || ch == ':' || ch.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect();
    let parse_one = |value: &str| {
        value
            .parse::<u32>()
            .map_err(|_| ValidationError::NotANumber(value.to_string()))
    };
    match parts.as_slice() {
        [single] => {
            let port = parse_one(single)?;
            Ok((port, port))
        }
        [start, end] => Ok((parse_one(start)?, parse_one(end)?)),
        _ => Err(ValidationError::Malformed(trimmed.to_string())),
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortPreset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub ranges: Vec<PortRange>,
}

/// Outcome of a termination request. These are results, not failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status")]
pub enum KillResult {
    Success,
    PermissionDenied { pid: u32 },
    ElevationRequired { pid: u32 },
    ProcessNotFound { pid: u32 },
    Error { message: String },
}

impl KillResult {
    pub fn label(&self) -> &'static str {
        match self {
            KillResult::Success => "Success",
            KillResult::PermissionDenied { .. } => "PermissionDenied",
            KillResult::ElevationRequired { .. } => "ElevationRequired",
            KillResult::ProcessNotFound { .. } => "ProcessNotFound",
            KillResult::Error { .. } => "Error",
        }
    }
}

/// Counts over the raw record set, shown next to the total/filtered counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortStats {
    pub total: usize,
    pub tcp: usize,
    pub udp: usize,
    pub processes: usize,
}

impl PortStats {
    pub fn from_records(records: &[PortRecord]) -> Self {
        let mut pids: Vec<u32> = records.iter().map(|record| record.pid).collect();
        pids.sort_unstable();
        pids.dedup();
        Self {
            total: records.len(),
            tcp: records
                .iter()
                .filter(|record| record.protocol == Protocol::Tcp)
                .count(),
            udp: records
                .iter()
                .filter(|record| record.protocol == Protocol::Udp)
                .count(),
            processes: pids.len(),
        }
    }
}
