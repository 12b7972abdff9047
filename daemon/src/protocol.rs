//! IPC protocol definitions (JSON messages)

use crate::classifier::FleetCounts;
use crate::config::Config;
use crate::terminator::KillOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Ping,
    GetStats,
    RunEnforcement,
    StartMonitoring,
    StopMonitoring,
    Checkpoint { params: CheckpointParams },
    GetReport,
    GetConfig,
    UpdateConfig { params: Config },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointParams {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Response { id: Option<String>, data: serde_json::Value },
    Outcome { data: OutcomeData },
    Status { data: StatusData },
}

impl Response {
    pub fn data(data: serde_json::Value) -> Self {
        Response::Response { id: None, data }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Response::data(serde_json::json!({ "error": message.into() }))
    }

    pub fn success() -> Self {
        Response::data(serde_json::json!({ "success": true }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeData {
    pub killed_by_age: usize,
    pub killed_by_memory: usize,
    pub killed_main: usize,
    pub messages: Vec<String>,
}

impl From<&KillOutcome> for OutcomeData {
    fn from(outcome: &KillOutcome) -> Self {
        Self {
            killed_by_age: outcome.killed_by_age,
            killed_by_memory: outcome.killed_by_memory,
            killed_main: outcome.killed_main,
            messages: outcome.messages.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusData {
    pub total: usize,
    pub over_age: usize,
    pub over_memory: usize,
    pub known: usize,
    pub unknown: usize,
    pub monitoring: bool,
    pub lines: Vec<String>,
}

impl StatusData {
    pub fn new(counts: FleetCounts, monitoring: bool, lines: Vec<String>) -> Self {
        Self {
            total: counts.total,
            over_age: counts.over_age,
            over_memory: counts.over_memory,
            known: counts.known,
            unknown: counts.unknown,
            monitoring,
            lines,
        }
    }
}
