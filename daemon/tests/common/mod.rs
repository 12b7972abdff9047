//! In-memory fleet and clock shared by the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone};
use fleetguard_daemon::collector::{
    extract_account, CollectorError, Enumeration, ProcessCollector, ProcessRecord,
};
use fleetguard_daemon::config::FleetNames;
use fleetguard_daemon::executor::{KillError, ProcessKiller};
use fleetguard_daemon::recorder::Clock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

pub const WORKER: &str = "zbe1";
pub const ORCHESTRATOR: &str = "ZennoPoster";

pub fn fleet_names() -> FleetNames {
    FleetNames {
        worker: WORKER.to_string(),
        orchestrator: ORCHESTRATOR.to_string(),
    }
}

pub fn worker(pid: u32, age_minutes: u64, memory_mb: u64) -> ProcessRecord {
    ProcessRecord {
        pid,
        name: WORKER.to_string(),
        memory_mb,
        age_minutes,
        command_line: None,
        account: None,
    }
}

pub fn worker_for(pid: u32, age_minutes: u64, memory_mb: u64, account: &str) -> ProcessRecord {
    let command_line = format!(r#"zbe1.exe --user-data-dir="C:\profiles\{account}" --no-first-run"#);
    ProcessRecord {
        account: extract_account(&command_line),
        command_line: Some(command_line),
        ..worker(pid, age_minutes, memory_mb)
    }
}

pub fn orchestrator(pid: u32, memory_mb: u64) -> ProcessRecord {
    ProcessRecord {
        pid,
        name: ORCHESTRATOR.to_string(),
        memory_mb,
        age_minutes: 600,
        command_line: Some("ZennoPoster.exe".to_string()),
        account: None,
    }
}

#[derive(Default)]
struct FleetState {
    processes: BTreeMap<u32, ProcessRecord>,
    kill_calls: Vec<u32>,
    refuse: HashSet<u32>,
    broken: bool,
    skipped: Vec<u32>,
}

/// Fake OS: a mutable process table that can also be killed.
#[derive(Default)]
pub struct FakeFleet {
    state: Mutex<FleetState>,
}

impl FakeFleet {
    pub fn new(records: impl IntoIterator<Item = ProcessRecord>) -> Self {
        let fleet = Self::default();
        for record in records {
            fleet.spawn(record);
        }
        fleet
    }

    pub fn spawn(&self, record: ProcessRecord) {
        self.state.lock().unwrap().processes.insert(record.pid, record);
    }

    pub fn exit(&self, pid: u32) {
        self.state.lock().unwrap().processes.remove(&pid);
    }

    pub fn set_memory(&self, pid: u32, memory_mb: u64) {
        if let Some(record) = self.state.lock().unwrap().processes.get_mut(&pid) {
            record.memory_mb = memory_mb;
        }
    }

    /// Kill requests for `pid` fail with a permission error.
    pub fn refuse_kill(&self, pid: u32) {
        self.state.lock().unwrap().refuse.insert(pid);
    }

    /// Every enumeration fails as if `/proc` were unreadable.
    pub fn break_enumeration(&self, broken: bool) {
        self.state.lock().unwrap().broken = broken;
    }

    /// Report `pid` as matched-but-unreadable on every pass.
    pub fn add_unreadable(&self, pid: u32) {
        self.state.lock().unwrap().skipped.push(pid);
    }

    pub fn kill_calls(&self) -> Vec<u32> {
        self.state.lock().unwrap().kill_calls.clone()
    }

    pub fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().processes.contains_key(&pid)
    }
}

impl ProcessCollector for FakeFleet {
    fn list(&self, name: &str) -> Result<Enumeration, CollectorError> {
        let state = self.state.lock().unwrap();
        if state.broken {
            return Err(CollectorError::Enumerate(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "proc unavailable",
            )));
        }
        let records = state
            .processes
            .values()
            .filter(|r| r.name == name)
            .cloned()
            .collect();
        let skipped = if name == WORKER {
            state
                .skipped
                .iter()
                .map(|&pid| fleetguard_daemon::collector::SkippedProcess {
                    pid,
                    error: CollectorError::Vanished { pid },
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(Enumeration { records, skipped })
    }

    fn command_line(&self, pid: u32) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .processes
            .get(&pid)
            .and_then(|r| r.command_line.clone())
    }
}

impl ProcessKiller for FakeFleet {
    fn kill(&self, pid: u32) -> Result<(), KillError> {
        let mut state = self.state.lock().unwrap();
        state.kill_calls.push(pid);
        if state.refuse.contains(&pid) {
            return Err(KillError::PermissionDenied(pid));
        }
        match state.processes.remove(&pid) {
            Some(_) => Ok(()),
            None => Err(KillError::NotFound(pid)),
        }
    }

    fn wait_for_exit(&self, pid: u32, _timeout: Duration) -> bool {
        !self.is_alive(pid)
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn at(hour: u32, minute: u32, second: u32) -> Self {
        let start = Local
            .with_ymd_and_hms(2024, 3, 15, hour, minute, second)
            .single()
            .expect("unambiguous local time");
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now = *now + ChronoDuration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap()
    }
}
