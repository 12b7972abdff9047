//! Session reports: a JSON time-series document plus a self-contained HTML view

use crate::collector::UNKNOWN_ACCOUNT;
use crate::session::{EventKind, MonitoringSession, ProcessCategory, ProcessSnapshot};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

pub const CURRENT_DATA_FILE: &str = "current_data.json";
pub const CURRENT_REPORT_FILE: &str = "current_report.html";

const PALETTE: [&str; 10] = [
    "#4ec9b0", "#ce9178", "#c586c0", "#9cdcfe", "#4fc1ff", "#f48771", "#b5cea8", "#d4d4d4",
    "#569cd6", "#dcdcaa",
];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub session: SessionInfo,
    pub orchestrator: ChartData,
    pub workers: ChartData,
    pub events: Vec<EventData>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub start_time: String,
    pub end_time: Option<String>,
    pub duration_minutes: f64,
    pub end_reason: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<DatasetInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub label: String,
    pub pid: u32,
    pub data: Vec<u64>,
    pub color: String,
    pub command_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub timestamp: String,
    pub pid: u32,
    pub category: ProcessCategory,
    pub process_name: String,
    pub event_type: EventKind,
    pub command_line: String,
    pub account: String,
}

pub fn render(session: &MonitoringSession) -> ReportDocument {
    let mut events: Vec<_> = session.events.iter().collect();
    events.sort_by_key(|e| e.timestamp);

    ReportDocument {
        session: SessionInfo {
            start_time: session.start_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            end_time: session
                .end_time
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
            duration_minutes: (session.duration_minutes() * 10.0).round() / 10.0,
            end_reason: session.end_reason.clone(),
            is_active: session.is_active(),
        },
        orchestrator: chart_data(session, ProcessCategory::Orchestrator),
        workers: chart_data(session, ProcessCategory::Worker),
        events: events
            .into_iter()
            .map(|e| EventData {
                timestamp: e.timestamp.format("%H:%M:%S").to_string(),
                pid: e.pid,
                category: e.category,
                process_name: e.process_name.clone(),
                event_type: e.kind,
                command_line: e.command_line.clone(),
                account: if e.account.is_empty() {
                    UNKNOWN_ACCOUNT.to_string()
                } else {
                    e.account.clone()
                },
            })
            .collect(),
    }
}

fn minute_key(snapshot: &ProcessSnapshot) -> String {
    snapshot.timestamp.format("%Y-%m-%d %H:%M").to_string()
}

fn dataset_label(first: &ProcessSnapshot) -> String {
    if first.category == ProcessCategory::Worker && first.account != UNKNOWN_ACCOUNT {
        format!("PID:{} ({})", first.pid, first.account)
    } else {
        format!("{} PID:{}", first.process_name, first.pid)
    }
}

/// One label per distinct sample minute; one dataset per pid, with 0 where
/// the pid has no reading in that minute.
fn chart_data(session: &MonitoringSession, category: ProcessCategory) -> ChartData {
    let mut snapshots: Vec<&ProcessSnapshot> = session
        .snapshots
        .iter()
        .filter(|s| s.category == category)
        .collect();
    if snapshots.is_empty() {
        return ChartData::default();
    }
    snapshots.sort_by_key(|s| s.timestamp);

    let mut minutes: BTreeMap<String, String> = BTreeMap::new();
    for snapshot in &snapshots {
        minutes
            .entry(minute_key(snapshot))
            .or_insert_with(|| snapshot.timestamp.format("%H:%M").to_string());
    }
    let slot: HashMap<&str, usize> = minutes
        .keys()
        .enumerate()
        .map(|(i, key)| (key.as_str(), i))
        .collect();

    let mut order: Vec<u32> = Vec::new();
    let mut by_pid: HashMap<u32, (&ProcessSnapshot, Vec<u64>)> = HashMap::new();
    for snapshot in &snapshots {
        let (_, data) = by_pid.entry(snapshot.pid).or_insert_with(|| {
            order.push(snapshot.pid);
            (*snapshot, vec![0; minutes.len()])
        });
        // Later readings within the same minute win.
        data[slot[minute_key(snapshot).as_str()]] = snapshot.memory_mb;
    }

    let datasets = order
        .iter()
        .enumerate()
        .filter_map(|(i, pid)| {
            let (first, data) = by_pid.remove(pid)?;
            Some(DatasetInfo {
                label: dataset_label(first),
                pid: *pid,
                data,
                color: PALETTE[i % PALETTE.len()].to_string(),
                command_line: first.command_line.clone(),
            })
        })
        .collect();

    ChartData {
        labels: minutes.into_values().collect(),
        datasets,
    }
}

pub fn to_json(document: &ReportDocument) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(document)?)
}

/// Standalone HTML page with the document inlined.
pub fn render_html(document: &ReportDocument) -> Result<String, ReportError> {
    // `</` inside a string literal would close the script element early.
    let json = serde_json::to_string(document)?.replace("</", "<\\/");
    Ok(HTML_TEMPLATE.replace("__REPORT_DATA__", &json))
}

/// Writes report artifacts into one directory, replacing whole files.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_paths(&self) -> (PathBuf, PathBuf) {
        (
            self.dir.join(CURRENT_DATA_FILE),
            self.dir.join(CURRENT_REPORT_FILE),
        )
    }

    /// Free paths for a closed session, derived from its start time. Sessions
    /// that start within the same second get `_2`, `_3`, ... suffixes.
    pub fn session_paths(&self, session: &MonitoringSession) -> (PathBuf, PathBuf) {
        let stamp = session.start_time.format("%Y-%m-%d_%H-%M-%S").to_string();
        let mut attempt = 1u32;
        loop {
            let name = if attempt == 1 {
                stamp.clone()
            } else {
                format!("{stamp}_{attempt}")
            };
            let data = self.dir.join(format!("data_{name}.json"));
            let html = self.dir.join(format!("report_{name}.html"));
            if !data.exists() && !html.exists() {
                return (data, html);
            }
            attempt += 1;
        }
    }

    pub fn write_current(&self, session: &MonitoringSession) -> Result<(), ReportError> {
        let (data, html) = self.current_paths();
        self.write_pair(session, &data, &html)
    }

    pub fn write_closed(&self, session: &MonitoringSession) -> Result<PathBuf, ReportError> {
        let (data, html) = self.session_paths(session);
        self.write_pair(session, &data, &html)?;
        Ok(html)
    }

    fn write_pair(
        &self,
        session: &MonitoringSession,
        data_path: &Path,
        html_path: &Path,
    ) -> Result<(), ReportError> {
        let document = render(session);
        self.write_atomic(data_path, to_json(&document)?.as_bytes())?;
        self.write_atomic(html_path, render_html(&document)?.as_bytes())
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), ReportError> {
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Resource Usage Report</title>
<script src="https://cdn.jsdelivr.net/npm/chart.js@4.4.0/dist/chart.umd.min.js"></script>
<style>
  body { font-family: 'Iosevka', 'Consolas', monospace; background: #0d1117; color: #c9d1d9; margin: 0; padding: 15px; }
  .container { max-width: 1900px; margin: 0 auto; }
  .panel { background: #161b22; border: 1px solid #30363d; padding: 12px 20px; border-radius: 6px; margin-bottom: 15px; }
  .event { padding: 6px 12px; margin-bottom: 4px; border-left: 3px solid #3fb950; background: #0d1117; font-size: 12px; }
  .event.stopped { border-left-color: #f85149; }
  canvas { max-height: 400px; }
</style>
</head>
<body>
<div class="container">
  <div class="panel"><h1>Resource Usage Report</h1></div>
  <div id="sessionInfo" class="panel"></div>
  <div class="panel"><h2>Orchestrator</h2><canvas id="orchestratorChart"></canvas></div>
  <div class="panel"><h2>Workers</h2><canvas id="workersChart"></canvas></div>
  <div id="events" class="panel"><h2>Events</h2></div>
</div>
<script>
const reportData = __REPORT_DATA__;

function esc(text) {
  const div = document.createElement('div');
  div.textContent = text == null ? '' : String(text);
  return div.innerHTML;
}

const s = reportData.session;
document.getElementById('sessionInfo').innerHTML =
  '<b>Started:</b> ' + esc(s.startTime) +
  (s.endTime ? ' &nbsp; <b>Ended:</b> ' + esc(s.endTime) + ' (' + esc(s.endReason) + ')' : ' &nbsp; <b>Active</b>') +
  ' &nbsp; <b>Duration:</b> ' + s.durationMinutes + ' min';

function drawChart(id, chart) {
  new Chart(document.getElementById(id), {
    type: 'line',
    data: {
      labels: chart.labels,
      datasets: chart.datasets.map(ds => ({
        label: ds.label, data: ds.data, borderColor: ds.color,
        backgroundColor: ds.color + '33', tension: 0.2, pointRadius: 2
      }))
    },
    options: {
      animation: false,
      plugins: {
        legend: { labels: { color: '#c9d1d9' } },
        tooltip: { callbacks: { afterLabel: ctx => chart.datasets[ctx.datasetIndex].commandLine } }
      },
      scales: {
        y: { beginAtZero: true, title: { display: true, text: 'Memory (MB)', color: '#c9d1d9' }, ticks: { color: '#c9d1d9' } },
        x: { ticks: { color: '#c9d1d9' } }
      }
    }
  });
}

drawChart('orchestratorChart', reportData.orchestrator);
drawChart('workersChart', reportData.workers);

const events = document.getElementById('events');
for (const e of reportData.events) {
  const row = document.createElement('div');
  row.className = 'event ' + e.eventType;
  row.title = e.commandLine;
  row.innerHTML = esc(e.timestamp) + ' ' + esc(e.eventType) + ' ' + esc(e.processName) +
    ' PID:' + e.pid + ' (' + esc(e.account) + ')';
  events.appendChild(row);
}
</script>
</body>
</html>
"#;
