mod common;

use chrono::{DateTime, Duration, Local, TimeZone};
use fleetguard_daemon::collector::UNKNOWN_ACCOUNT;
use fleetguard_daemon::report::{self, ReportWriter, CURRENT_DATA_FILE, CURRENT_REPORT_FILE};
use fleetguard_daemon::session::{
    EventKind, MonitoringSession, ProcessCategory, ProcessEvent, ProcessSnapshot,
};
use tempfile::tempdir;

fn at(hour: u32, minute: u32, second: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2024, 3, 15, hour, minute, second)
        .single()
        .unwrap()
}

fn snapshot(
    timestamp: DateTime<Local>,
    pid: u32,
    category: ProcessCategory,
    memory_mb: u64,
    account: &str,
) -> ProcessSnapshot {
    let process_name = match category {
        ProcessCategory::Orchestrator => common::ORCHESTRATOR,
        ProcessCategory::Worker => common::WORKER,
    };
    ProcessSnapshot {
        timestamp,
        pid,
        category,
        process_name: process_name.to_string(),
        memory_mb,
        command_line: format!("{process_name}.exe --pid-{pid}"),
        account: account.to_string(),
        alive: true,
    }
}

fn worker(timestamp: DateTime<Local>, pid: u32, memory_mb: u64) -> ProcessSnapshot {
    snapshot(timestamp, pid, ProcessCategory::Worker, memory_mb, UNKNOWN_ACCOUNT)
}

#[test]
fn test_labels_are_distinct_sorted_minutes() {
    let mut session = MonitoringSession::new(at(10, 0, 0));
    session.snapshots = vec![
        worker(at(10, 2, 5), 1, 30),
        worker(at(10, 0, 10), 1, 10),
        worker(at(10, 1, 10), 1, 20),
        worker(at(10, 1, 40), 1, 25),
    ];

    let doc = report::render(&session);
    assert_eq!(doc.workers.labels, vec!["10:00", "10:01", "10:02"]);
    assert_eq!(doc.workers.datasets.len(), 1);
    // The later reading inside 10:01 wins.
    assert_eq!(doc.workers.datasets[0].data, vec![10, 25, 30]);
    assert!(doc.orchestrator.labels.is_empty());
    assert!(doc.orchestrator.datasets.is_empty());
}

#[test]
fn test_missing_minutes_are_zero_filled() {
    let mut session = MonitoringSession::new(at(10, 0, 0));
    session.snapshots = vec![
        worker(at(10, 0, 0), 1, 100),
        worker(at(10, 1, 0), 1, 110),
        worker(at(10, 1, 0), 2, 50),
        worker(at(10, 2, 0), 2, 60),
    ];

    let doc = report::render(&session);
    let by_pid = |pid: u32| {
        doc.workers
            .datasets
            .iter()
            .find(|d| d.pid == pid)
            .map(|d| d.data.clone())
            .unwrap()
    };
    assert_eq!(by_pid(1), vec![100, 110, 0]);
    assert_eq!(by_pid(2), vec![0, 50, 60]);
    assert!(doc
        .workers
        .datasets
        .iter()
        .all(|d| d.data.len() == doc.workers.labels.len()));
    assert_ne!(doc.workers.datasets[0].color, doc.workers.datasets[1].color);
}

#[test]
fn test_dataset_labels() {
    let mut session = MonitoringSession::new(at(10, 0, 0));
    session.snapshots = vec![
        snapshot(at(10, 0, 0), 9, ProcessCategory::Orchestrator, 4000, UNKNOWN_ACCOUNT),
        snapshot(at(10, 0, 0), 1, ProcessCategory::Worker, 100, "acc_a"),
        worker(at(10, 0, 0), 2, 100),
    ];

    let doc = report::render(&session);
    assert_eq!(doc.orchestrator.datasets[0].label, "ZennoPoster PID:9");
    let labels: Vec<&str> = doc.workers.datasets.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["PID:1 (acc_a)", "zbe1 PID:2"]);
    assert_eq!(doc.workers.datasets[0].command_line, "zbe1.exe --pid-1");
}

#[test]
fn test_events_sorted_and_session_info() {
    let mut session = MonitoringSession::new(at(10, 0, 0));
    let late = worker(at(10, 5, 0), 2, 10);
    let early = worker(at(10, 1, 0), 1, 10);
    session.events = vec![
        ProcessEvent::from_snapshot(&late, EventKind::Stopped, late.timestamp),
        ProcessEvent::from_snapshot(&early, EventKind::Started, early.timestamp),
    ];
    session.close(at(10, 7, 30), "AppExit");

    let doc = report::render(&session);
    assert_eq!(doc.events[0].timestamp, "10:01:00");
    assert_eq!(doc.events[0].pid, 1);
    assert_eq!(doc.events[1].event_type, EventKind::Stopped);
    assert_eq!(doc.events[1].account, UNKNOWN_ACCOUNT);

    assert_eq!(doc.session.start_time, "2024-03-15 10:00:00");
    assert_eq!(doc.session.end_time.as_deref(), Some("2024-03-15 10:07:30"));
    assert_eq!(doc.session.duration_minutes, 7.5);
    assert_eq!(doc.session.end_reason.as_deref(), Some("AppExit"));
    assert!(!doc.session.is_active);
}

#[test]
fn test_json_uses_camel_case_fields() {
    let mut session = MonitoringSession::new(at(10, 0, 0));
    session.snapshots = vec![worker(at(10, 0, 0), 1, 10)];
    let json: serde_json::Value =
        serde_json::from_str(&report::to_json(&report::render(&session)).unwrap()).unwrap();

    assert_eq!(json["session"]["isActive"], true);
    assert_eq!(json["session"]["startTime"], "2024-03-15 10:00:00");
    assert_eq!(json["workers"]["datasets"][0]["commandLine"], "zbe1.exe --pid-1");
    assert!(json["orchestrator"]["labels"].as_array().unwrap().is_empty());
}

#[test]
fn test_html_embeds_escaped_document() {
    let mut session = MonitoringSession::new(at(10, 0, 0));
    let mut hostile = worker(at(10, 0, 0), 1, 10);
    hostile.command_line = "zbe1.exe </script><b>".to_string();
    session.snapshots = vec![hostile];

    let html = report::render_html(&report::render(&session)).unwrap();
    assert!(!html.contains("__REPORT_DATA__"));
    assert!(html.contains(r#""startTime":"2024-03-15 10:00:00""#));
    assert!(html.contains(r"zbe1.exe <\/script>"));
    assert_eq!(html.matches("</script>").count(), 2);
}

#[test]
fn test_writer_file_names() {
    let dir = tempdir().unwrap();
    let writer = ReportWriter::create(dir.path().join("reports")).unwrap();
    let mut session = MonitoringSession::new(at(9, 5, 7));
    session.snapshots = vec![worker(at(9, 5, 7), 1, 10)];

    writer.write_current(&session).unwrap();
    assert!(writer.dir().join(CURRENT_DATA_FILE).exists());
    assert!(writer.dir().join(CURRENT_REPORT_FILE).exists());

    session.close(session.start_time + Duration::minutes(3), "UserStopped");
    let html = writer.write_closed(&session).unwrap();
    assert_eq!(html, writer.dir().join("report_2024-03-15_09-05-07.html"));
    assert!(writer.dir().join("data_2024-03-15_09-05-07.json").exists());

    let saved: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(writer.dir().join("data_2024-03-15_09-05-07.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["session"]["endReason"], "UserStopped");
    assert_eq!(saved["session"]["durationMinutes"], 3.0);
}

#[test]
fn test_sessions_starting_in_same_second_keep_separate_files() {
    let dir = tempdir().unwrap();
    let writer = ReportWriter::create(dir.path()).unwrap();

    let mut first = MonitoringSession::new(at(10, 0, 0));
    first.close(at(10, 0, 0), "ZennoPosterKilled");
    let mut second = MonitoringSession::new(at(10, 0, 0));
    second.close(at(10, 0, 0), "AppExit");

    let first_html = writer.write_closed(&first).unwrap();
    let second_html = writer.write_closed(&second).unwrap();
    assert_eq!(first_html, dir.path().join("report_2024-03-15_10-00-00.html"));
    assert_eq!(second_html, dir.path().join("report_2024-03-15_10-00-00_2.html"));

    let reason = |file: &str| {
        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(file)).unwrap())
                .unwrap();
        saved["session"]["endReason"].as_str().unwrap().to_string()
    };
    assert_eq!(reason("data_2024-03-15_10-00-00.json"), "ZennoPosterKilled");
    assert_eq!(reason("data_2024-03-15_10-00-00_2.json"), "AppExit");
}
