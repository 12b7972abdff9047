//! Monitoring session data model

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessCategory {
    Orchestrator,
    Worker,
}

impl fmt::Display for ProcessCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessCategory::Orchestrator => f.write_str("orchestrator"),
            ProcessCategory::Worker => f.write_str("worker"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Started,
    Stopped,
}

/// One resource reading for one process observed alive at sample time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub timestamp: DateTime<Local>,
    pub pid: u32,
    pub category: ProcessCategory,
    /// Actual process name, e.g. the configured worker executable.
    pub process_name: String,
    pub memory_mb: u64,
    pub command_line: String,
    pub account: String,
    pub alive: bool,
}

/// Start/stop occurrence derived by diffing consecutive samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub timestamp: DateTime<Local>,
    pub pid: u32,
    pub category: ProcessCategory,
    pub process_name: String,
    pub kind: EventKind,
    pub command_line: String,
    pub account: String,
}

impl ProcessEvent {
    pub fn from_snapshot(snapshot: &ProcessSnapshot, kind: EventKind, at: DateTime<Local>) -> Self {
        Self {
            timestamp: at,
            pid: snapshot.pid,
            category: snapshot.category,
            process_name: snapshot.process_name.clone(),
            kind,
            command_line: snapshot.command_line.clone(),
            account: snapshot.account.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSession {
    pub start_time: DateTime<Local>,
    pub end_time: Option<DateTime<Local>>,
    pub snapshots: Vec<ProcessSnapshot>,
    pub events: Vec<ProcessEvent>,
    pub end_reason: Option<String>,
}

impl MonitoringSession {
    pub fn new(start_time: DateTime<Local>) -> Self {
        Self {
            start_time,
            end_time: None,
            snapshots: Vec::new(),
            events: Vec::new(),
            end_reason: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    /// Closes the session. The end time never precedes the start time.
    pub fn close(&mut self, at: DateTime<Local>, reason: impl Into<String>) {
        self.end_time = Some(at.max(self.start_time));
        self.end_reason = Some(reason.into());
    }

    pub fn duration_minutes(&self) -> f64 {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds() as f64 / 60_000.0)
            .unwrap_or(0.0)
    }
}
