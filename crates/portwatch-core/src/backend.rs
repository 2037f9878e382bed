use crate::error::TransportError;
use crate::{KillResult, PortPreset, PortRange, PortRecord};

/// Whatever actually discovers sockets and signals processes.
///
/// Calls may block; the front end runs them on the blocking pool and never
/// on its event loop.
pub trait PortBackend: Send + Sync {
    fn discover_ports(&self) -> Result<Vec<PortRecord>, TransportError>;

    /// Only records whose port falls inside `range`.
    fn scan_port_range(&self, range: PortRange) -> Result<Vec<PortRecord>, TransportError>;

    fn terminate_process(&self, pid: u32) -> Result<KillResult, TransportError>;

    fn terminate_process_elevated(&self, pid: u32) -> Result<KillResult, TransportError>;

    fn list_presets(&self) -> Result<Vec<PortPreset>, TransportError>;
}
