//! Session recorder: periodic fleet sampling with start/stop event derivation

use crate::collector::{Enumeration, ProcessCollector};
use crate::config::FleetNames;
use crate::report::{self, ReportDocument, ReportWriter};
use crate::session::{EventKind, MonitoringSession, ProcessCategory, ProcessEvent, ProcessSnapshot};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub const APP_EXIT_REASON: &str = "AppExit";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// What one sampling pass appended to the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleSummary {
    pub snapshots: usize,
    pub started: usize,
    pub stopped: usize,
    pub skipped: usize,
}

#[derive(Default)]
struct RecorderState {
    /// `Some` exactly while the recorder is running.
    session: Option<MonitoringSession>,
    /// Last sample, keyed by pid; the reference for start/stop diffs.
    baseline: HashMap<u32, ProcessSnapshot>,
    closed: Vec<MonitoringSession>,
    cancel_timer: Option<oneshot::Sender<()>>,
}

struct RecorderInner {
    collector: Arc<dyn ProcessCollector>,
    clock: Arc<dyn Clock>,
    writer: Option<ReportWriter>,
    fleet: FleetNames,
    state: Mutex<RecorderState>,
}

#[derive(Clone)]
pub struct SessionRecorder {
    inner: Arc<RecorderInner>,
}

impl SessionRecorder {
    pub fn new(
        collector: Arc<dyn ProcessCollector>,
        fleet: FleetNames,
        writer: Option<ReportWriter>,
    ) -> Self {
        Self::with_clock(collector, fleet, writer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        collector: Arc<dyn ProcessCollector>,
        fleet: FleetNames,
        writer: Option<ReportWriter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(RecorderInner {
                collector,
                clock,
                writer,
                fleet,
                state: Mutex::new(RecorderState::default()),
            }),
        }
    }

    /// Opens a session and arms the sampling timer. The first sample happens
    /// one full interval later. Returns `false` if already running.
    pub async fn start(&self, interval: Duration) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.session.is_some() {
            return false;
        }
        state.session = Some(MonitoringSession::new(self.inner.clock.now()));
        state.baseline.clear();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        state.cancel_timer = Some(cancel_tx);
        tokio::spawn(run_timer(Arc::clone(&self.inner), interval, cancel_rx));
        info!(interval_secs = interval.as_secs(), "resource monitoring started");
        true
    }

    /// Closes the current session, opens a new one and samples it at once.
    /// Returns `false` when the recorder is not running.
    pub async fn checkpoint(&self, reason: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(mut finished) = state.session.take() else {
            return false;
        };
        let now = self.inner.clock.now();
        finished.close(now, reason);
        self.inner.flush(&finished);
        state.closed.push(finished);
        state.baseline.clear();
        state.session = Some(MonitoringSession::new(now));
        info!(reason, "monitoring checkpoint");
        self.inner.sample_locked(&mut state);
        true
    }

    /// Cancels the timer and closes the current session. A sample already in
    /// flight finishes first since it holds the state lock.
    pub async fn stop(&self, reason: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let Some(mut finished) = state.session.take() else {
            return false;
        };
        if let Some(cancel) = state.cancel_timer.take() {
            let _ = cancel.send(());
        }
        finished.close(self.inner.clock.now(), reason);
        self.inner.flush(&finished);
        state.closed.push(finished);
        state.baseline.clear();
        info!(reason, "resource monitoring stopped");
        true
    }

    /// Runs one sampling pass immediately. `None` when not running or when
    /// the fleet could not be enumerated.
    pub async fn sample_now(&self) -> Option<SampleSummary> {
        self.inner.sample().await
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.session.is_some()
    }

    pub async fn current_session(&self) -> Option<MonitoringSession> {
        self.inner.state.lock().await.session.clone()
    }

    pub async fn closed_sessions(&self) -> Vec<MonitoringSession> {
        self.inner.state.lock().await.closed.clone()
    }

    pub async fn current_report(&self) -> Option<ReportDocument> {
        let state = self.inner.state.lock().await;
        state.session.as_ref().map(report::render)
    }
}

async fn run_timer(inner: Arc<RecorderInner>, period: Duration, mut cancel: oneshot::Receiver<()>) {
    let period = period.max(Duration::from_secs(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    // One tick at a time; a slow sample pushes the next one back.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = &mut cancel => break,
            _ = ticker.tick() => {
                if let Some(summary) = inner.sample().await {
                    debug!(?summary, "sample recorded");
                }
            }
        }
    }
    debug!("sampling timer stopped");
}

impl RecorderInner {
    async fn sample(&self) -> Option<SampleSummary> {
        let mut state = self.state.lock().await;
        self.sample_locked(&mut state)
    }

    fn enumerate(&self, name: &str) -> Option<Enumeration> {
        match self.collector.list(name) {
            Ok(enumeration) => Some(enumeration),
            Err(e) => {
                error!(process = name, "sampling aborted: {}", e);
                None
            }
        }
    }

    fn sample_locked(&self, state: &mut RecorderState) -> Option<SampleSummary> {
        let RecorderState {
            session, baseline, ..
        } = state;
        let session = session.as_mut()?;

        // Enumerate everything before touching the session so a failed sweep
        // cannot be mistaken for the whole fleet stopping.
        let orchestrators = self.enumerate(&self.fleet.orchestrator)?;
        let workers = self.enumerate(&self.fleet.worker)?;

        let timestamp = self.clock.now();
        let mut summary = SampleSummary {
            skipped: orchestrators.skipped.len() + workers.skipped.len(),
            ..SampleSummary::default()
        };
        let mut current = HashMap::new();

        for (category, enumeration) in [
            (ProcessCategory::Orchestrator, &orchestrators),
            (ProcessCategory::Worker, &workers),
        ] {
            for record in &enumeration.records {
                let snapshot = ProcessSnapshot {
                    timestamp,
                    pid: record.pid,
                    category,
                    process_name: record.name.clone(),
                    memory_mb: record.memory_mb,
                    command_line: record.command_line.clone().unwrap_or_default(),
                    account: record.account_label().to_string(),
                    alive: true,
                };
                if !baseline.contains_key(&record.pid) {
                    session
                        .events
                        .push(ProcessEvent::from_snapshot(&snapshot, EventKind::Started, timestamp));
                    summary.started += 1;
                }
                session.snapshots.push(snapshot.clone());
                current.insert(record.pid, snapshot);
                summary.snapshots += 1;
            }
        }

        let mut gone: Vec<&ProcessSnapshot> = baseline
            .values()
            .filter(|last| !current.contains_key(&last.pid))
            .collect();
        gone.sort_by_key(|last| last.pid);
        for last in gone {
            session
                .events
                .push(ProcessEvent::from_snapshot(last, EventKind::Stopped, timestamp));
            summary.stopped += 1;
        }
        *baseline = current;

        if let Some(writer) = &self.writer {
            if let Err(e) = writer.write_current(session) {
                warn!("failed to update current report: {}", e);
            }
        }
        Some(summary)
    }

    fn flush(&self, session: &MonitoringSession) {
        let Some(writer) = &self.writer else {
            return;
        };
        match writer.write_closed(session) {
            Ok(path) => info!(path = %path.display(), "session report saved"),
            Err(e) => warn!("failed to save session report: {}", e),
        }
        if let Err(e) = writer.write_current(session) {
            warn!("failed to update current report: {}", e);
        }
    }
}
