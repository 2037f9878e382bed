use portwatch_core::{PortRange, Protocol};
use portwatch_procfs::{ProcessDirectory, ProcessInfo, ProcfsBackend, ScanError};
use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use tempfile::TempDir;

const HEADER: &str =
    "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";

struct StaticProcesses(HashMap<u32, ProcessInfo>);

impl ProcessDirectory for StaticProcesses {
    fn describe(&self, pid: u32) -> Option<ProcessInfo> {
        self.0.get(&pid).cloned()
    }
}

fn processes() -> StaticProcesses {
    let mut table = HashMap::new();
    for (pid, name, user) in [
        (100, "nginx", "www-data"),
        (200, "node", "alice"),
        (300, "dnsmasq", "nobody"),
    ] {
        table.insert(
            pid,
            ProcessInfo {
                name: name.to_string(),
                user: user.to_string(),
            },
        );
    }
    StaticProcesses(table)
}

fn row(slot: usize, endpoint: &str, state: &str, inode: u64) -> String {
    format!(
        "   {slot}: {endpoint} 00000000:0000 {state} 00000000:00000000 00:00000000 00000000  1000        0 {inode} 1 0000000000000000 100 0 0 10 0"
    )
}

fn link_socket(root: &Path, pid: u32, fd: u32, inode: u64) {
    let fd_dir = root.join(pid.to_string()).join("fd");
    fs::create_dir_all(&fd_dir).expect("fd dir");
    symlink(format!("socket:[{inode}]"), fd_dir.join(fd.to_string())).expect("link");
}

fn build_tree(with_v6: bool) -> TempDir {
    let root = TempDir::new().expect("tempdir");
    let net = root.path().join("net");
    fs::create_dir_all(&net).expect("net dir");

    let tcp = [
        HEADER.to_string(),
        row(0, "00000000:1F90", "0A", 2001),
        row(1, "0100007F:0050", "0A", 1001),
        row(2, "0100007F:0051", "01", 1002),
        row(3, "0100007F:0016", "0A", 9999),
    ]
    .join("\n");
    fs::write(net.join("tcp"), tcp).expect("tcp");

    let udp = [HEADER.to_string(), row(0, "00000000:0035", "07", 3001)].join("\n");
    fs::write(net.join("udp"), udp).expect("udp");

    if with_v6 {
        let tcp6 = [
            HEADER.to_string(),
            row(0, "00000000000000000000000000000000:1F90", "0A", 2002),
            row(1, "00000000000000000000000001000000:01BB", "0A", 1003),
        ]
        .join("\n");
        fs::write(net.join("tcp6"), tcp6).expect("tcp6");
    }

    link_socket(root.path(), 100, 3, 1001);
    link_socket(root.path(), 100, 4, 1002);
    link_socket(root.path(), 100, 5, 1003);
    link_socket(root.path(), 200, 7, 2001);
    link_socket(root.path(), 200, 8, 2002);
    link_socket(root.path(), 300, 3, 3001);
    root
}

#[test]
fn discovery_joins_tables_with_owners_sorted_by_port() {
    let root = build_tree(true);
    let backend = ProcfsBackend::with_root(root.path());
    let records = backend.collect(&processes(), None).expect("collect");

    let summary: Vec<(u16, Protocol, u32, &str)> = records
        .iter()
        .map(|record| (record.port, record.protocol, record.pid, record.address.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (53, Protocol::Udp, 300, "0.0.0.0"),
            (80, Protocol::Tcp, 100, "127.0.0.1"),
            (443, Protocol::Tcp, 100, "::1"),
            (8080, Protocol::Tcp, 200, "0.0.0.0"),
        ]
    );
    assert_eq!(records[1].process_name, "nginx");
    assert_eq!(records[3].user, "alice");
}

#[test]
fn range_scan_only_returns_ports_inside_range() {
    let root = build_tree(true);
    let backend = ProcfsBackend::with_root(root.path());
    let range = PortRange::new(80, 1000).expect("range");
    let ports: Vec<u16> = backend
        .collect(&processes(), Some(range))
        .expect("collect")
        .iter()
        .map(|record| record.port)
        .collect();
    assert_eq!(ports, vec![80, 443]);
}

#[test]
fn missing_v6_tables_are_tolerated() {
    let root = build_tree(false);
    let backend = ProcfsBackend::with_root(root.path());
    let records = backend.collect(&processes(), None).expect("collect");
    assert_eq!(records.len(), 3);
}

#[test]
fn missing_v4_table_is_an_io_error() {
    let root = build_tree(false);
    fs::remove_file(root.path().join("net").join("udp")).expect("remove udp");
    let backend = ProcfsBackend::with_root(root.path());
    assert!(matches!(
        backend.collect(&processes(), None),
        Err(ScanError::Io { .. })
    ));
}
