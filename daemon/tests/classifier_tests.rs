mod common;

use common::{orchestrator, worker, worker_for};
use fleetguard_daemon::classifier::{Classifier, IdentitySource};
use fleetguard_daemon::config::Thresholds;

fn thresholds() -> Thresholds {
    Thresholds {
        max_age_minutes: 30,
        max_memory_mb: 1000,
        max_orchestrator_memory_mb: 20000,
    }
}

fn pids(records: &[fleetguard_daemon::collector::ProcessRecord]) -> Vec<u32> {
    records.iter().map(|r| r.pid).collect()
}

#[test]
fn test_over_age_and_over_memory_are_independent() {
    let workers = vec![worker(100, 45, 1200), worker(101, 10, 50)];
    let result = Classifier::new(thresholds()).classify(&workers, &[]);
    assert_eq!(pids(&result.over_age), vec![100]);
    assert_eq!(pids(&result.over_memory), vec![100]);
}

#[test]
fn test_thresholds_are_strict() {
    let workers = vec![worker(1, 30, 1000), worker(2, 31, 1001)];
    let result = Classifier::new(thresholds()).classify(&workers, &[]);
    assert_eq!(pids(&result.over_age), vec![2]);
    assert_eq!(pids(&result.over_memory), vec![2]);
}

#[test]
fn test_identity_partition_is_exclusive() {
    let workers = vec![
        worker_for(1, 5, 100, "acc_1"),
        worker(2, 50, 2000),
        worker_for(3, 50, 100, "acc_3"),
    ];
    let result = Classifier::new(thresholds()).classify(&workers, &[]);
    assert_eq!(pids(&result.has_identity), vec![1, 3]);
    assert_eq!(pids(&result.no_identity), vec![2]);
    // Missing identity does not exempt a worker from the candidate sets.
    assert_eq!(pids(&result.over_age), vec![2, 3]);
    assert_eq!(pids(&result.over_memory), vec![2]);
}

#[test]
fn test_orchestrators_are_reported_but_never_candidates() {
    let result = Classifier::new(thresholds())
        .classify(&[worker_for(5, 1, 10, "acc")], &[orchestrator(900, 50_000)]);
    assert_eq!(pids(&result.no_identity), vec![900]);
    assert!(result.over_age.is_empty());
    assert!(result.over_memory.is_empty());

    let counts = result.counts();
    assert_eq!(counts.total, 2);
    assert_eq!(counts.known, 1);
    assert_eq!(counts.unknown, 1);
    assert_eq!(
        result.lines,
        vec![
            "pid: 5, age: 1Min, mem: 10Mb, arg: acc".to_string(),
            "pid: 900, type: ZennoPoster, age: 600Min, mem: 50000Mb".to_string(),
        ]
    );
}

#[test]
fn test_raw_command_line_identity() {
    let mut bare = worker(7, 1, 1);
    bare.command_line = Some("zbe1.exe --headless".to_string());
    let workers = vec![bare, worker(8, 1, 1)];
    let result = Classifier::new(thresholds())
        .with_identity(IdentitySource::RawCommandLine)
        .classify(&workers, &[]);
    assert_eq!(pids(&result.has_identity), vec![7]);
    assert_eq!(pids(&result.no_identity), vec![8]);
    assert_eq!(result.lines[0], "pid: 7, age: 1Min, mem: 1Mb, arg: zbe1.exe --headless");
}
