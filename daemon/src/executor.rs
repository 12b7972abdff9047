//! Process action executor (kill and bounded exit wait)

use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum KillError {
    #[error("process {0} not found")]
    NotFound(u32),
    #[error("permission denied killing process {0}")]
    PermissionDenied(u32),
    #[error("kill({pid}) failed: {source}")]
    Os {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

pub trait ProcessKiller: Send + Sync {
    /// Sends a hard termination request. `Ok` means the OS accepted it.
    fn kill(&self, pid: u32) -> Result<(), KillError>;

    /// Blocks until `pid` is gone or `timeout` elapses; returns whether it exited.
    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool;
}

/// Kills with `SIGKILL` and watches `/proc` for the exit.
pub struct SignalKiller {
    proc_root: PathBuf,
}

impl SignalKiller {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Watches exits under `root` instead of `/proc`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
        }
    }

    fn has_exited(&self, pid: u32) -> bool {
        match fs::read_to_string(self.proc_root.join(pid.to_string()).join("stat")) {
            // A zombie has exited; only its parent can reap it.
            Ok(stat) => stat
                .rfind(')')
                .and_then(|i| stat[i + 1..].split_whitespace().next())
                .map(|state| state == "Z" || state == "X")
                .unwrap_or(false),
            Err(_) => true,
        }
    }
}

impl Default for SignalKiller {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessKiller for SignalKiller {
    fn kill(&self, pid: u32) -> Result<(), KillError> {
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
        if result == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ESRCH) => Err(KillError::NotFound(pid)),
            Some(libc::EPERM) => Err(KillError::PermissionDenied(pid)),
            _ => Err(KillError::Os { pid, source: err }),
        }
    }

    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.has_exited(pid) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(EXIT_POLL_INTERVAL.min(deadline - now));
        }
    }
}
