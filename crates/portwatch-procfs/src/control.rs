//! SIGTERM delivery, plain and through `pkexec`.

use portwatch_core::KillResult;
use std::process::Command;
use sysinfo::{get_current_pid, Pid, Signal, System, Uid, Users};
use tracing::{info, warn};

const PKEXEC: &str = "pkexec";
const PKEXEC_DISMISSED: i32 = 126;
const PKEXEC_NOT_FOUND: i32 = 127;
const KILL_FAILED: i32 = 1;

pub fn process_alive(pid: u32) -> bool {
    let mut system = System::new();
    system.refresh_process(Pid::from_u32(pid))
}

fn current_uid(system: &mut System) -> Option<Uid> {
    let me = get_current_pid().ok()?;
    system.refresh_process(me);
    system.process(me)?.user_id().cloned()
}

fn is_superuser(uid: &Uid) -> bool {
    Users::new_with_refreshed_list()
        .get_user_by_id(uid)
        .is_some_and(|user| user.name() == "root")
}

/// Sends SIGTERM as the current user.
pub fn terminate(pid: u32) -> KillResult {
    let mut system = System::new();
    let me = current_uid(&mut system);
    let target = Pid::from_u32(pid);
    if !system.refresh_process(target) {
        return KillResult::ProcessNotFound { pid };
    }
    let Some(process) = system.process(target) else {
        return KillResult::ProcessNotFound { pid };
    };

    if let (Some(owner), Some(me)) = (process.user_id(), me.as_ref()) {
        if owner != me && !is_superuser(me) {
            info!(event = "terminate_denied", pid, reason = "foreign_owner");
            return KillResult::PermissionDenied { pid };
        }
    }

    match process.kill_with(Signal::Term) {
        Some(true) => {
            info!(event = "terminate_sent", pid);
            KillResult::Success
        }
        Some(false) if process_alive(pid) => KillResult::PermissionDenied { pid },
        Some(false) => KillResult::ProcessNotFound { pid },
        None => KillResult::Error {
            message: "SIGTERM is not supported on this platform".to_string(),
        },
    }
}

/// Runs `pkexec kill -TERM <pid>`, which prompts through the polkit agent.
pub fn terminate_elevated(pid: u32) -> KillResult {
    if !process_alive(pid) {
        return KillResult::ProcessNotFound { pid };
    }

    let status = Command::new(PKEXEC)
        .arg("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status();

    match status {
        Ok(status) if status.success() => {
            info!(event = "terminate_elevated_sent", pid);
            KillResult::Success
        }
        Ok(status) => {
            let code = status.code();
            let still_running = code == Some(KILL_FAILED) && process_alive(pid);
            let result = classify_pkexec_exit(pid, code, still_running);
            warn!(event = "terminate_elevated_failed", pid, code = ?code, result = result.label());
            result
        }
        Err(err) => {
            warn!(event = "terminate_elevated_spawn_failed", pid, error = %err);
            KillResult::Error {
                message: format!("failed to run {PKEXEC}: {err}"),
            }
        }
    }
}

/// Maps a non-zero pkexec exit. `still_running` only matters for exit 1, where
/// `kill` failing because the process already went away still counts.
pub fn classify_pkexec_exit(pid: u32, code: Option<i32>, still_running: bool) -> KillResult {
    match code {
        Some(0) => KillResult::Success,
        Some(PKEXEC_DISMISSED) => KillResult::Error {
            message: "authentication cancelled".to_string(),
        },
        Some(PKEXEC_NOT_FOUND) => KillResult::Error {
            message: "pkexec not found; install polkit".to_string(),
        },
        Some(KILL_FAILED) if !still_running => KillResult::Success,
        Some(KILL_FAILED) => KillResult::Error {
            message: format!("failed to terminate process {pid}"),
        },
        other => KillResult::Error {
            message: format!("pkexec exited with {other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkexec_exit_codes() {
        assert_eq!(
            classify_pkexec_exit(5, Some(126), true),
            KillResult::Error {
                message: "authentication cancelled".to_string()
            }
        );
        assert!(matches!(
            classify_pkexec_exit(5, Some(127), true),
            KillResult::Error { message } if message.contains("pkexec not found")
        ));
        assert_eq!(classify_pkexec_exit(5, Some(1), false), KillResult::Success);
        assert!(matches!(
            classify_pkexec_exit(5, Some(1), true),
            KillResult::Error { .. }
        ));
        assert!(matches!(
            classify_pkexec_exit(5, None, true),
            KillResult::Error { message } if message.contains("None")
        ));
    }

    #[test]
    fn own_process_is_alive_and_bogus_pid_is_not() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(u32::MAX - 1));
    }

    #[test]
    fn terminating_missing_process_reports_not_found() {
        assert_eq!(
            terminate(u32::MAX - 1),
            KillResult::ProcessNotFound { pid: u32::MAX - 1 }
        );
        assert_eq!(
            terminate_elevated(u32::MAX - 1),
            KillResult::ProcessNotFound { pid: u32::MAX - 1 }
        );
    }
}
