//! Enforcement runs shared by the IPC trigger and the auto-check timer

use crate::collector::ProcessCollector;
use crate::config::Config;
use crate::executor::ProcessKiller;
use crate::recovery::TaskQueueRecovery;
use crate::terminator::{KillOutcome, Terminator};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

pub struct Enforcer {
    collector: Arc<dyn ProcessCollector>,
    killer: Arc<dyn ProcessKiller>,
    running: Mutex<()>,
}

impl Enforcer {
    pub fn new(collector: Arc<dyn ProcessCollector>, killer: Arc<dyn ProcessKiller>) -> Self {
        Self {
            collector,
            killer,
            running: Mutex::new(()),
        }
    }

    /// Runs one enforcement pass under `config` with task-queue recovery
    /// attached. Passes never overlap: a caller arriving mid-run waits and
    /// then sees the fleet the previous pass left behind.
    pub async fn run(&self, config: Arc<Config>) -> KillOutcome {
        let _running = self.running.lock().await;
        debug!("enforcement pass started");
        let collector = Arc::clone(&self.collector);
        let killer = Arc::clone(&self.killer);

        // Blocks for up to the orchestrator exit timeout.
        tokio::task::spawn_blocking(move || {
            let fleet = config.fleet_names();
            let recovery = TaskQueueRecovery::in_dir(
                &config.task_queue_dir(),
                &config.fleet.task_queue_file,
                &config.fleet.task_queue_backup_file,
            );
            Terminator::new(collector.as_ref(), killer.as_ref(), &fleet)
                .with_exit_hook(&recovery)
                .run(&config.policy())
        })
        .await
        .unwrap_or_else(|e| KillOutcome {
            messages: vec![format!("Critical error: {e}")],
            ..KillOutcome::default()
        })
    }
}
