//! Process enumeration for the supervised fleet (reads /proc on Linux)

mod linux;

pub use linux::LinuxProcessCollector;

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// Label used wherever a process has no extractable account.
pub const UNKNOWN_ACCOUNT: &str = "unknown";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// One live process, produced fresh on every enumeration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub memory_mb: u64,
    pub age_minutes: u64,
    pub command_line: Option<String>,
    pub account: Option<String>,
}

impl ProcessRecord {
    /// Account label for display; falls back to [`UNKNOWN_ACCOUNT`].
    pub fn account_label(&self) -> &str {
        self.account.as_deref().unwrap_or(UNKNOWN_ACCOUNT)
    }
}

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("cannot enumerate processes: {0}")]
    Enumerate(#[source] std::io::Error),
    #[error("process {pid} exited before it could be read")]
    Vanished { pid: u32 },
    #[error("cannot read process {pid}: {source}")]
    Read {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed stat line for process {pid}")]
    MalformedStat { pid: u32 },
}

/// A process that matched the name but could not be read.
#[derive(Debug)]
pub struct SkippedProcess {
    pub pid: u32,
    pub error: CollectorError,
}

/// Result of one enumeration pass. Partial results are the norm: processes
/// that vanish or deny access mid-sweep land in `skipped`.
#[derive(Debug, Default)]
pub struct Enumeration {
    pub records: Vec<ProcessRecord>,
    pub skipped: Vec<SkippedProcess>,
}

pub trait ProcessCollector: Send + Sync {
    /// Lists every live process whose name matches `name` exactly.
    fn list(&self, name: &str) -> Result<Enumeration, CollectorError>;

    /// Optional command-line lookup; `None` when unavailable.
    fn command_line(&self, pid: u32) -> Option<String>;
}

/// Floor-divides a raw byte count into whole megabytes.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes / BYTES_PER_MB
}

fn user_data_dir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"--user-data-dir=(?:"([^"]+)"|([^\s"]+))"#).expect("valid user-data-dir regex")
    })
}

/// Extracts the account label from a `--user-data-dir="<path>"` argument:
/// the final segment of the path, after trailing separators are stripped.
pub fn extract_account(command_line: &str) -> Option<String> {
    let captures = user_data_dir_pattern().captures(command_line)?;
    let path = captures.get(1).or_else(|| captures.get(2))?.as_str();
    let trimmed = path.trim_end_matches(['\\', '/']);
    let segment = trimmed.rsplit(['\\', '/']).next()?;
    if segment.is_empty() {
        None
    } else {
        Some(segment.to_string())
    }
}
