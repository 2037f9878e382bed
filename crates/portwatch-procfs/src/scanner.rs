//! `/proc/net/{tcp,udp}{,6}` table parsing.
//!
//! Row layout (header skipped):
//! `sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode ...`

use portwatch_core::Protocol;
use std::fs;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const TCP_LISTEN: &str = "0A";
const MIN_COLUMNS: usize = 10;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse socket table: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy)]
pub struct NetTable {
    pub file: &'static str,
    pub protocol: Protocol,
    pub family: Family,
}

impl NetTable {
    /// Only TCP has a listen state; every bound UDP socket counts.
    fn listen_only(&self) -> bool {
        self.protocol == Protocol::Tcp
    }
}

pub const TABLES: [NetTable; 4] = [
    NetTable {
        file: "tcp",
        protocol: Protocol::Tcp,
        family: Family::V4,
    },
    NetTable {
        file: "udp",
        protocol: Protocol::Udp,
        family: Family::V4,
    },
    NetTable {
        file: "tcp6",
        protocol: Protocol::Tcp,
        family: Family::V6,
    },
    NetTable {
        file: "udp6",
        protocol: Protocol::Udp,
        family: Family::V6,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEntry {
    pub address: String,
    pub port: u16,
    pub inode: u64,
    pub protocol: Protocol,
}

/// Reads every table under `<root>/net`. The IPv6 tables are optional since
/// kernels built without IPv6 do not have them.
pub fn scan_all(root: &Path) -> Result<Vec<SocketEntry>, ScanError> {
    let mut entries = Vec::new();
    for table in TABLES {
        let path = root.join("net").join(table.file);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if table.family == Family::V6 && err.kind() == io::ErrorKind::NotFound => {
                debug!(event = "socket_table_missing", path = %path.display());
                continue;
            }
            Err(source) => return Err(ScanError::Io { path, source }),
        };
        entries.extend(parse_table(&content, table)?);
    }
    Ok(entries)
}

pub fn parse_table(content: &str, table: NetTable) -> Result<Vec<SocketEntry>, ScanError> {
    let mut entries = Vec::new();
    for line in content.lines().skip(1) {
        if let Some(entry) = parse_line(line, table)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

fn parse_line(line: &str, table: NetTable) -> Result<Option<SocketEntry>, ScanError> {
    let columns: Vec<&str> = line.split_whitespace().collect();
    if columns.len() < MIN_COLUMNS {
        return Ok(None);
    }
    if table.listen_only() && columns[3] != TCP_LISTEN {
        return Ok(None);
    }

    let (address, port) = decode_endpoint(columns[1], table.family)?;
    if port == 0 {
        return Ok(None);
    }
    let inode: u64 = columns[9]
        .parse()
        .map_err(|_| ScanError::Parse(format!("invalid inode {}", columns[9])))?;
    if inode == 0 {
        return Ok(None);
    }

    Ok(Some(SocketEntry {
        address,
        port,
        inode,
        protocol: table.protocol,
    }))
}

fn decode_endpoint(field: &str, family: Family) -> Result<(String, u16), ScanError> {
    let (host, port) = field
        .split_once(':')
        .ok_or_else(|| ScanError::Parse(format!("invalid endpoint {field}")))?;
    let port = u16::from_str_radix(port, 16)
        .map_err(|_| ScanError::Parse(format!("invalid port {port}")))?;
    let address = match family {
        Family::V4 => decode_v4(host)?.to_string(),
        Family::V6 => decode_v6(host)?.to_string(),
    };
    Ok((address, port))
}

fn hex_word(hex: &str) -> Result<[u8; 4], ScanError> {
    u32::from_str_radix(hex, 16)
        .map(u32::to_le_bytes)
        .map_err(|_| ScanError::Parse(format!("invalid address word {hex}")))
}

/// One host-order 32-bit word, e.g. `0100007F` is 127.0.0.1.
fn decode_v4(hex: &str) -> Result<Ipv4Addr, ScanError> {
    if hex.len() != 8 {
        return Err(ScanError::Parse(format!("invalid IPv4 address {hex}")));
    }
    Ok(Ipv4Addr::from(hex_word(hex)?))
}

/// Four host-order 32-bit words.
fn decode_v6(hex: &str) -> Result<Ipv6Addr, ScanError> {
    if hex.len() != 32 || !hex.is_ascii() {
        return Err(ScanError::Parse(format!("invalid IPv6 address {hex}")));
    }
    let mut octets = [0u8; 16];
    for (idx, chunk) in octets.chunks_exact_mut(4).enumerate() {
        chunk.copy_from_slice(&hex_word(&hex[idx * 8..idx * 8 + 8])?);
    }
    Ok(Ipv6Addr::from(octets))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";

    fn table(file: &str) -> NetTable {
        TABLES
            .into_iter()
            .find(|table| table.file == file)
            .expect("known table")
    }

    #[test]
    fn tcp_keeps_only_listening_rows() {
        let content = format!(
            "{HEADER}\n   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 12345 1 0000000000000000 100 0 0 10 0\n   1: 0100007F:0050 0100007F:C350 01 00000000:00000000 00:00000000 00000000  1000        0 12346 1\n"
        );
        let entries = parse_table(&content, table("tcp")).expect("parse");
        assert_eq!(
            entries,
            vec![SocketEntry {
                address: "127.0.0.1".to_string(),
                port: 8080,
                inode: 12345,
                protocol: Protocol::Tcp,
            }]
        );
    }

    #[test]
    fn udp_keeps_bound_rows_and_skips_unowned() {
        let content = format!(
            "{HEADER}\n   0: 00000000:0035 00000000:0000 07 00000000:00000000 00:00000000 00000000     0        0 11111 1\n   1: 00000000:0044 00000000:0000 07 00000000:00000000 00:00000000 00000000     0        0 0 1\n   2: 00000000:0000 00000000:0000 07 00000000:00000000 00:00000000 00000000     0        0 4 1\n"
        );
        let entries = parse_table(&content, table("udp")).expect("parse");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "0.0.0.0");
        assert_eq!(entries[0].port, 53);
    }

    #[test]
    fn ipv6_words_are_decoded_host_order() {
        assert_eq!(
            decode_v6("00000000000000000000000001000000").expect("loopback"),
            Ipv6Addr::LOCALHOST
        );
        assert_eq!(
            decode_v6("000080FE00000000FF005002FE0A1F37")
                .expect("link local")
                .to_string(),
            "fe80::250:ff:371f:afe"
        );
        let content = format!(
            "{HEADER}\n   0: 00000000000000000000000000000000:01BB 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 777 1\n"
        );
        let entries = parse_table(&content, table("tcp6")).expect("parse");
        assert_eq!(entries[0].address, "::");
        assert_eq!(entries[0].port, 443);
    }

    #[test]
    fn short_and_malformed_rows() {
        let short = format!("{HEADER}\n   0: 0100007F:1F90\n");
        assert!(parse_table(&short, table("tcp")).expect("short").is_empty());

        let bad_inode = format!(
            "{HEADER}\n   0: 0100007F:1F90 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 nope\n"
        );
        assert!(matches!(
            parse_table(&bad_inode, table("tcp")),
            Err(ScanError::Parse(_))
        ));

        assert!(decode_v4("7F").is_err());
    }
}
