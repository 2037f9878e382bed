//! Linux backend: reads socket tables and fd links straight from `/proc`.

use portwatch_core::{
    builtin_presets, KillResult, PortBackend, PortPreset, PortRange, PortRecord, RecordKey,
    TransportError,
};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

pub mod control;
pub mod resolver;
pub mod scanner;

pub use resolver::{ProcessDirectory, ProcessInfo, SystemProcesses};
pub use scanner::ScanError;

pub const DEFAULT_PROC_ROOT: &str = "/proc";

#[derive(Debug, Clone)]
pub struct ProcfsBackend {
    root: PathBuf,
}

impl Default for ProcfsBackend {
    fn default() -> Self {
        Self::with_root(DEFAULT_PROC_ROOT)
    }
}

impl ProcfsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Joins socket table rows with their owning processes. Sockets without a
    /// resolvable owner are dropped; duplicates of one identity triple (the
    /// same process bound on v4 and v6) keep the first row. Sorted by port.
    pub fn collect(
        &self,
        processes: &dyn ProcessDirectory,
        range: Option<PortRange>,
    ) -> Result<Vec<PortRecord>, ScanError> {
        let entries = scanner::scan_all(&self.root)?;
        let owners = resolver::socket_owners(&self.root);

        let mut seen: HashSet<RecordKey> = HashSet::new();
        let mut records = Vec::new();
        let mut unresolved = 0usize;
        for entry in entries {
            if range.is_some_and(|range| !range.contains(entry.port)) {
                continue;
            }
            let Some((pid, info)) = owners
                .get(&entry.inode)
                .and_then(|&pid| processes.describe(pid).map(|info| (pid, info)))
            else {
                unresolved += 1;
                continue;
            };
            let record = PortRecord {
                pid,
                process_name: info.name,
                port: entry.port,
                protocol: entry.protocol,
                address: entry.address,
                user: info.user,
            };
            if seen.insert(record.key()) {
                records.push(record);
            }
        }

        records.sort_by_key(|record| record.port);
        debug!(
            event = "procfs_collect",
            records = records.len(),
            unresolved,
            ranged = range.is_some()
        );
        Ok(records)
    }

    fn collect_live(
        &self,
        operation: &'static str,
        range: Option<PortRange>,
    ) -> Result<Vec<PortRecord>, TransportError> {
        let processes = SystemProcesses::snapshot(&self.root);
        self.collect(&processes, range)
            .map_err(|err| TransportError::backend(operation, err.to_string()))
    }
}

impl PortBackend for ProcfsBackend {
    fn discover_ports(&self) -> Result<Vec<PortRecord>, TransportError> {
        self.collect_live("discover_ports", None)
    }

    fn scan_port_range(&self, range: PortRange) -> Result<Vec<PortRecord>, TransportError> {
        self.collect_live("scan_port_range", Some(range))
    }

    fn terminate_process(&self, pid: u32) -> Result<KillResult, TransportError> {
        Ok(control::terminate(pid))
    }

    fn terminate_process_elevated(&self, pid: u32) -> Result<KillResult, TransportError> {
        Ok(control::terminate_elevated(pid))
    }

    fn list_presets(&self) -> Result<Vec<PortPreset>, TransportError> {
        Ok(builtin_presets())
    }
}
