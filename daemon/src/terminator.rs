//! Policy enforcement: terminates over-age / over-memory workers and, when
//! allowed, an orchestrator that exceeds its own memory limit.

use crate::classifier::{is_over_age, is_over_memory};
use crate::collector::{CollectorError, ProcessCollector, ProcessRecord};
use crate::config::{EnforcementPolicy, FleetNames};
use crate::executor::ProcessKiller;
use crate::recovery::OrchestratorExitHook;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

pub const ORCHESTRATOR_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KillOutcome {
    pub killed_by_age: usize,
    pub killed_by_memory: usize,
    pub killed_main: usize,
    pub messages: Vec<String>,
}

impl KillOutcome {
    /// Sum of the three counters. A worker over both limits counts twice.
    pub fn total(&self) -> usize {
        self.killed_by_age + self.killed_by_memory + self.killed_main
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KillReason {
    Age,
    Memory,
}

impl KillReason {
    fn describe(self) -> &'static str {
        match self {
            KillReason::Age => "old",
            KillReason::Memory => "heavy",
        }
    }
}

pub struct Terminator<'a> {
    collector: &'a dyn ProcessCollector,
    killer: &'a dyn ProcessKiller,
    fleet: &'a FleetNames,
    exit_hooks: Vec<&'a dyn OrchestratorExitHook>,
    exit_timeout: Duration,
}

impl<'a> Terminator<'a> {
    pub fn new(
        collector: &'a dyn ProcessCollector,
        killer: &'a dyn ProcessKiller,
        fleet: &'a FleetNames,
    ) -> Self {
        Self {
            collector,
            killer,
            fleet,
            exit_hooks: Vec::new(),
            exit_timeout: ORCHESTRATOR_EXIT_TIMEOUT,
        }
    }

    pub fn with_exit_hook(mut self, hook: &'a dyn OrchestratorExitHook) -> Self {
        self.exit_hooks.push(hook);
        self
    }

    /// Enumerates the worker fleet and enforces `policy` on it.
    pub fn run(&self, policy: &EnforcementPolicy) -> KillOutcome {
        match self.collector.list(&self.fleet.worker) {
            Ok(enumeration) => {
                let mut outcome = self.enforce(&enumeration.records, policy);
                if !enumeration.skipped.is_empty() {
                    outcome.messages.insert(
                        0,
                        format!("Skipped {} unreadable worker processes", enumeration.skipped.len()),
                    );
                }
                outcome
            }
            Err(e) => KillOutcome {
                messages: vec![format!("Critical error: {e}")],
                ..KillOutcome::default()
            },
        }
    }

    /// Enforces `policy` on already-enumerated workers. Never fails: per-process
    /// errors and unexpected failures end up in the message log.
    pub fn enforce(&self, workers: &[ProcessRecord], policy: &EnforcementPolicy) -> KillOutcome {
        let mut outcome = KillOutcome::default();
        if let Err(e) = self.enforce_inner(workers, policy, &mut outcome) {
            warn!("enforcement aborted: {}", e);
            outcome.messages.push(format!("Critical error: {e}"));
        }
        outcome
    }

    fn enforce_inner(
        &self,
        workers: &[ProcessRecord],
        policy: &EnforcementPolicy,
        outcome: &mut KillOutcome,
    ) -> Result<(), CollectorError> {
        outcome
            .messages
            .push(format!("Found {} worker processes", workers.len()));

        let by_age: Vec<u32> = workers
            .iter()
            .filter(|r| is_over_age(r, &policy.thresholds))
            .map(|r| r.pid)
            .collect();
        let by_memory: Vec<u32> = workers
            .iter()
            .filter(|r| is_over_memory(r, &policy.thresholds))
            .map(|r| r.pid)
            .collect();

        let mut terminated = HashSet::new();
        if policy.kill_old && !by_age.is_empty() {
            let killed = self.kill_batch(KillReason::Age, &by_age, &mut terminated, outcome);
            outcome.killed_by_age = killed;
        }
        if policy.kill_heavy && !by_memory.is_empty() {
            let killed = self.kill_batch(KillReason::Memory, &by_memory, &mut terminated, outcome);
            outcome.killed_by_memory = killed;
        }

        if policy.kill_main {
            self.enforce_orchestrator(policy, outcome)?;
        }
        Ok(())
    }

    fn kill_batch(
        &self,
        reason: KillReason,
        pids: &[u32],
        terminated: &mut HashSet<u32>,
        outcome: &mut KillOutcome,
    ) -> usize {
        outcome.messages.push(format!(
            "Killing {} {} processes...",
            pids.len(),
            reason.describe()
        ));
        let mut killed = 0;
        for &pid in pids {
            // Same process already taken down by the other policy in this run.
            if terminated.contains(&pid) {
                killed += 1;
                outcome
                    .messages
                    .push(format!("✓ PID {pid} already terminated in this run"));
                continue;
            }
            match self.killer.kill(pid) {
                Ok(()) => {
                    terminated.insert(pid);
                    killed += 1;
                    outcome.messages.push(format!("✓ Killed PID: {pid}"));
                }
                Err(e) => {
                    warn!(pid, "kill failed: {}", e);
                    outcome
                        .messages
                        .push(format!("✗ Failed to kill PID: {pid} - {e}"));
                }
            }
        }
        killed
    }

    fn enforce_orchestrator(
        &self,
        policy: &EnforcementPolicy,
        outcome: &mut KillOutcome,
    ) -> Result<(), CollectorError> {
        let limit = policy.thresholds.max_orchestrator_memory_mb;
        let enumeration = self.collector.list(&self.fleet.orchestrator)?;
        let mut queued = Vec::new();

        for record in &enumeration.records {
            outcome.messages.push(format!(
                "{} PID:{} uses {}MB (limit: {}MB)",
                self.fleet.orchestrator, record.pid, record.memory_mb, limit
            ));
            if record.memory_mb > limit {
                outcome.messages.push("  → Over the limit, will be killed.".to_string());
                queued.push(record);
            } else {
                outcome.messages.push("  → Within limits.".to_string());
            }
        }

        if queued.is_empty() {
            outcome.messages.push(format!(
                "✓ {} is within limits, not killing it.",
                self.fleet.orchestrator
            ));
            return Ok(());
        }

        outcome.messages.push(format!(
            "⚠ Killing {} {} process(es)...",
            queued.len(),
            self.fleet.orchestrator
        ));
        for record in queued {
            let pid = record.pid;
            if let Err(e) = self.killer.kill(pid) {
                warn!(pid, "orchestrator kill failed: {}", e);
                outcome
                    .messages
                    .push(format!("✗ Failed to kill PID: {pid} - {e}"));
                continue;
            }
            info!(pid, memory_mb = record.memory_mb, "orchestrator killed");
            outcome
                .messages
                .push(format!("☠ Killed PID: {pid} (was {}MB)", record.memory_mb));
            outcome
                .messages
                .push(format!("⏳ Waiting for process {pid} to exit..."));
            // A slow exit still counts as killed.
            if !self.killer.wait_for_exit(pid, self.exit_timeout) {
                outcome.messages.push(format!(
                    "PID {pid} still running after {}s",
                    self.exit_timeout.as_secs()
                ));
            }
            for hook in &self.exit_hooks {
                hook.after_exit(pid, &mut outcome.messages);
            }
            outcome.killed_main += 1;
        }
        Ok(())
    }
}
