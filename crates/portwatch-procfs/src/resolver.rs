//! Socket inode to owning process.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use sysinfo::{Pid, System, Users};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub name: String,
    pub user: String,
}

/// Name and owner lookup for a pid.
pub trait ProcessDirectory {
    fn describe(&self, pid: u32) -> Option<ProcessInfo>;
}

/// `socket:[12345]` -> `12345`.
pub fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Walks `<root>/<pid>/fd/*` and records which pid holds each socket inode.
/// Processes whose fd directory cannot be read (exited, or owned by another
/// user) are skipped.
pub fn socket_owners(root: &Path) -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let Ok(entries) = fs::read_dir(root) else {
        return owners;
    };

    for entry in entries.flatten() {
        let Some(pid) = entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u32>().ok())
        else {
            continue;
        };
        let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            let Ok(target) = fs::read_link(fd.path()) else {
                continue;
            };
            if let Some(inode) = parse_socket_link(&target.to_string_lossy()) {
                owners.insert(inode, pid);
            }
        }
    }
    owners
}

/// Real uid from `<root>/<pid>/status`.
pub fn status_uid(root: &Path, pid: u32) -> Option<u32> {
    let status = fs::read_to_string(root.join(pid.to_string()).join("status")).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

/// Process table and user list captured once per scan.
pub struct SystemProcesses {
    system: System,
    users: Users,
    root: PathBuf,
}

impl SystemProcesses {
    pub fn snapshot(root: &Path) -> Self {
        let mut system = System::new();
        system.refresh_processes();
        Self {
            system,
            users: Users::new_with_refreshed_list(),
            root: root.to_path_buf(),
        }
    }
}

impl ProcessDirectory for SystemProcesses {
    fn describe(&self, pid: u32) -> Option<ProcessInfo> {
        let process = self.system.process(Pid::from_u32(pid))?;
        let user = process
            .user_id()
            .and_then(|uid| self.users.get_user_by_id(uid))
            .map(|user| user.name().to_string())
            .or_else(|| status_uid(&self.root, pid).map(|uid| uid.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        Some(ProcessInfo {
            name: process.name().to_string(),
            user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn socket_link_pattern() {
        assert_eq!(parse_socket_link("socket:[12345]"), Some(12345));
        assert_eq!(parse_socket_link("pipe:[12345]"), None);
        assert_eq!(parse_socket_link("socket:[abc]"), None);
        assert_eq!(parse_socket_link("/dev/null"), None);
    }

    #[test]
    fn owners_come_from_fd_links() {
        let root = TempDir::new().expect("tempdir");
        let fd_dir = root.path().join("4242").join("fd");
        fs::create_dir_all(&fd_dir).expect("fd dir");
        symlink("socket:[900]", fd_dir.join("3")).expect("socket link");
        symlink("/dev/null", fd_dir.join("0")).expect("null link");
        fs::create_dir_all(root.path().join("self")).expect("non-pid dir");
        fs::create_dir_all(root.path().join("77")).expect("no fd dir");

        let owners = socket_owners(root.path());
        assert_eq!(owners.len(), 1);
        assert_eq!(owners.get(&900), Some(&4242));
    }

    #[test]
    fn status_uid_reads_real_uid() {
        let root = TempDir::new().expect("tempdir");
        let pid_dir = root.path().join("10");
        fs::create_dir_all(&pid_dir).expect("pid dir");
        fs::write(
            pid_dir.join("status"),
            "Name:\tnginx\nUid:\t33\t33\t33\t33\nGid:\t33\t33\t33\t33\n",
        )
        .expect("status");
        assert_eq!(status_uid(root.path(), 10), Some(33));
        assert_eq!(status_uid(root.path(), 11), None);
    }
}
