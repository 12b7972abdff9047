//! Fleet classification: over-age / over-memory candidates and identity partition

use crate::collector::{ProcessRecord, UNKNOWN_ACCOUNT};
use crate::config::Thresholds;
use serde::Serialize;

/// Where a worker's identity label comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentitySource {
    /// Final segment of `--user-data-dir`.
    #[default]
    Account,
    /// The whole command line.
    RawCommandLine,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationResult {
    pub over_age: Vec<ProcessRecord>,
    pub over_memory: Vec<ProcessRecord>,
    pub has_identity: Vec<ProcessRecord>,
    pub no_identity: Vec<ProcessRecord>,
    /// Display line per process, workers first, then orchestrators.
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FleetCounts {
    pub total: usize,
    pub over_age: usize,
    pub over_memory: usize,
    pub known: usize,
    pub unknown: usize,
}

impl ClassificationResult {
    pub fn counts(&self) -> FleetCounts {
        FleetCounts {
            total: self.has_identity.len() + self.no_identity.len(),
            over_age: self.over_age.len(),
            over_memory: self.over_memory.len(),
            known: self.has_identity.len(),
            unknown: self.no_identity.len(),
        }
    }
}

pub fn is_over_age(record: &ProcessRecord, thresholds: &Thresholds) -> bool {
    record.age_minutes > thresholds.max_age_minutes
}

pub fn is_over_memory(record: &ProcessRecord, thresholds: &Thresholds) -> bool {
    record.memory_mb > thresholds.max_memory_mb
}

pub struct Classifier {
    thresholds: Thresholds,
    identity: IdentitySource,
}

impl Classifier {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            identity: IdentitySource::Account,
        }
    }

    pub fn with_identity(mut self, identity: IdentitySource) -> Self {
        self.identity = identity;
        self
    }

    fn identity_label<'a>(&self, record: &'a ProcessRecord) -> &'a str {
        match self.identity {
            IdentitySource::Account => record.account_label(),
            IdentitySource::RawCommandLine => record
                .command_line
                .as_deref()
                .filter(|c| !c.is_empty())
                .unwrap_or(UNKNOWN_ACCOUNT),
        }
    }

    /// Partitions workers by thresholds and identity. Orchestrators are only
    /// reported: they always land in `no_identity` and never in a candidate set.
    pub fn classify(
        &self,
        workers: &[ProcessRecord],
        orchestrators: &[ProcessRecord],
    ) -> ClassificationResult {
        let mut result = ClassificationResult::default();

        for record in workers {
            let label = self.identity_label(record);
            result.lines.push(format!(
                "pid: {}, age: {}Min, mem: {}Mb, arg: {}",
                record.pid, record.age_minutes, record.memory_mb, label
            ));

            if is_over_memory(record, &self.thresholds) {
                result.over_memory.push(record.clone());
            }
            if is_over_age(record, &self.thresholds) {
                result.over_age.push(record.clone());
            }

            if label.is_empty() || label == UNKNOWN_ACCOUNT {
                result.no_identity.push(record.clone());
            } else {
                result.has_identity.push(record.clone());
            }
        }

        for record in orchestrators {
            result.lines.push(format!(
                "pid: {}, type: {}, age: {}Min, mem: {}Mb",
                record.pid, record.name, record.age_minutes, record.memory_mb
            ));
            result.no_identity.push(record.clone());
        }

        result
    }
}
