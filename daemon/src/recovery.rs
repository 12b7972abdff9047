//! Repair of the orchestrator's task-queue file after a forced kill
//!
//! Killing the orchestrator mid-write can leave its task queue truncated to
//! zero bytes. When that happens and the backup sibling still holds data, the
//! backup is copied over the primary. Every other combination is left alone.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Runs after an orchestrator process has been terminated.
pub trait OrchestratorExitHook: Send + Sync {
    /// Appends human-readable progress to `log`.
    fn after_exit(&self, pid: u32, log: &mut Vec<String>);
}

#[derive(Debug)]
pub enum RecoveryOutcome {
    PrimaryMissing,
    BackupMissing,
    PrimaryIntact { size: u64 },
    BackupEmpty,
    Restored { bytes: u64 },
    Failed(io::Error),
}

impl fmt::Display for RecoveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryOutcome::PrimaryMissing => write!(f, "task queue file not found, nothing to recover"),
            RecoveryOutcome::BackupMissing => write!(f, "task queue backup not found, cannot recover"),
            RecoveryOutcome::PrimaryIntact { size } => {
                write!(f, "task queue file intact ({size} bytes), no recovery needed")
            }
            RecoveryOutcome::BackupEmpty => {
                write!(f, "task queue file is empty and backup is empty too, cannot recover")
            }
            RecoveryOutcome::Restored { bytes } => {
                write!(f, "task queue file restored from backup ({bytes} bytes)")
            }
            RecoveryOutcome::Failed(e) => write!(f, "task queue recovery failed: {e}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskQueueRecovery {
    primary: PathBuf,
    backup: PathBuf,
}

impl TaskQueueRecovery {
    pub fn new(primary: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
        }
    }

    pub fn in_dir(dir: &Path, file: &str, backup_file: &str) -> Self {
        Self::new(dir.join(file), dir.join(backup_file))
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    pub fn recover(&self) -> RecoveryOutcome {
        match self.try_recover() {
            Ok(outcome) => outcome,
            Err(e) => RecoveryOutcome::Failed(e),
        }
    }

    fn try_recover(&self) -> io::Result<RecoveryOutcome> {
        let Some(primary_size) = file_size(self.primary())? else {
            return Ok(RecoveryOutcome::PrimaryMissing);
        };
        let Some(backup_size) = file_size(self.backup())? else {
            return Ok(RecoveryOutcome::BackupMissing);
        };
        if primary_size != 0 {
            return Ok(RecoveryOutcome::PrimaryIntact { size: primary_size });
        }
        if backup_size == 0 {
            return Ok(RecoveryOutcome::BackupEmpty);
        }
        fs::remove_file(self.primary())?;
        let bytes = fs::copy(self.backup(), self.primary())?;
        Ok(RecoveryOutcome::Restored { bytes })
    }
}

fn file_size(path: &Path) -> io::Result<Option<u64>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

impl OrchestratorExitHook for TaskQueueRecovery {
    fn after_exit(&self, pid: u32, log: &mut Vec<String>) {
        log.push(format!(
            "Checking task queue {} after PID {} exit...",
            self.primary().display(),
            pid
        ));
        let outcome = self.recover();
        match &outcome {
            RecoveryOutcome::Restored { .. } => info!(pid, "{}", outcome),
            RecoveryOutcome::Failed(_) | RecoveryOutcome::BackupEmpty => {
                warn!(pid, "{}", outcome)
            }
            _ => debug!(pid, "{}", outcome),
        }
        log.push(outcome.to_string());
    }
}
