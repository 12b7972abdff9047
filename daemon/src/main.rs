use anyhow::Result;
use fleetguard_daemon::{
    classifier::{ClassificationResult, Classifier, IdentitySource},
    collector::{CollectorError, LinuxProcessCollector, ProcessCollector},
    config::{Config, SettingsHandle},
    enforcement::Enforcer,
    executor::{ProcessKiller, SignalKiller},
    notifier::Notifier,
    protocol::{OutcomeData, Request, Response, StatusData},
    recorder::{SessionRecorder, APP_EXIT_REASON},
    report::ReportWriter,
    shutdown::ShutdownSignals,
    socket::{handle_client, RequestHandler, SocketServer},
    terminator::KillOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const SETTINGS_CHANGED_REASON: &str = "SettingsChanged";
const USER_STOP_REASON: &str = "UserStopped";

struct DaemonState {
    collector: Arc<LinuxProcessCollector>,
    enforcer: Enforcer,
    recorder: SessionRecorder,
    settings: SettingsHandle,
    broadcast_tx: broadcast::Sender<String>,
    auto_check: Mutex<Option<JoinHandle<()>>>,
}

impl DaemonState {
    fn classify(&self, config: &Config) -> Result<ClassificationResult, CollectorError> {
        let workers = self.collector.list(&config.fleet.worker_process_name)?;
        let orchestrators = self.collector.list(&config.fleet.orchestrator_process_name)?;
        let identity = if config.ui.show_raw_command_line {
            IdentitySource::RawCommandLine
        } else {
            IdentitySource::Account
        };
        Ok(Classifier::new(config.thresholds())
            .with_identity(identity)
            .classify(&workers.records, &orchestrators.records))
    }

    async fn run_enforcement(&self) -> KillOutcome {
        let config = self.settings.current().await;
        let outcome = self.enforcer.run(Arc::clone(&config)).await;

        for message in &outcome.messages {
            info!("{}", message);
        }
        info!(
            killed_by_age = outcome.killed_by_age,
            killed_by_memory = outcome.killed_by_memory,
            killed_main = outcome.killed_main,
            "enforcement finished"
        );

        if outcome.killed_main > 0 {
            let reason = format!("{}Killed", config.fleet.orchestrator_process_name);
            self.recorder.checkpoint(&reason).await;
        }

        Notifier::new(config.ui.notifications).notify_outcome(&outcome, config.ui.show_logs);

        let broadcast = Response::Outcome {
            data: OutcomeData::from(&outcome),
        };
        if let Ok(json) = serde_json::to_string(&broadcast) {
            let _ = self.broadcast_tx.send(json);
        }
        outcome
    }

    async fn start_monitoring(&self, config: &Config) -> bool {
        let minutes = config.monitoring.monitoring_interval_minutes;
        self.recorder
            .start(Duration::from_secs(minutes.saturating_mul(60)))
            .await
    }

    /// Re-arms the recorder and the auto-check timer for `config`.
    async fn apply_settings(self: &Arc<Self>, config: &Config) {
        self.recorder.stop(SETTINGS_CHANGED_REASON).await;
        if config.monitoring.enable_resource_monitoring {
            self.start_monitoring(config).await;
        }

        let mut auto_check = self.auto_check.lock().await;
        if let Some(handle) = auto_check.take() {
            handle.abort();
        }
        let minutes = config.policy.auto_check_interval_minutes;
        if minutes > 0 {
            let state = Arc::clone(self);
            *auto_check = Some(tokio::spawn(async move {
                auto_check_loop(state, Duration::from_secs(minutes * 60)).await;
            }));
            info!(minutes, "auto-check enabled");
        }
    }
}

async fn auto_check_loop(state: Arc<DaemonState>, period: Duration) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        state.run_enforcement().await;
    }
}

struct Handler(Arc<DaemonState>);

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle(&self, request: Request) -> Response {
        let state = &self.0;
        match request {
            Request::Ping => Response::Pong,

            Request::GetStats => {
                let config = state.settings.current().await;
                match state.classify(&config) {
                    Ok(result) => Response::Status {
                        data: StatusData::new(
                            result.counts(),
                            state.recorder.is_running().await,
                            result.lines,
                        ),
                    },
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::RunEnforcement => {
                let outcome = state.run_enforcement().await;
                Response::Outcome {
                    data: OutcomeData::from(&outcome),
                }
            }

            Request::StartMonitoring => {
                let config = state.settings.current().await;
                let started = state.start_monitoring(&config).await;
                Response::data(serde_json::json!({ "started": started }))
            }

            Request::StopMonitoring => {
                let stopped = state.recorder.stop(USER_STOP_REASON).await;
                Response::data(serde_json::json!({ "stopped": stopped }))
            }

            Request::Checkpoint { params } => {
                if state.recorder.checkpoint(&params.reason).await {
                    Response::success()
                } else {
                    Response::error("monitoring is not running")
                }
            }

            Request::GetReport => match state.recorder.current_report().await {
                Some(report) => match serde_json::to_value(report) {
                    Ok(data) => Response::data(data),
                    Err(e) => Response::error(e.to_string()),
                },
                None => Response::error("monitoring is not running"),
            },

            // The UI edits this copy and sends it back through `update_config`.
            Request::GetConfig => {
                let draft = state.settings.draft().await;
                match serde_json::to_value(&draft) {
                    Ok(data) => Response::data(data),
                    Err(e) => Response::error(e.to_string()),
                }
            }

            Request::UpdateConfig { params } => match state.settings.commit(params).await {
                Ok(config) => {
                    state.apply_settings(&config).await;
                    info!("settings updated");
                    Response::success()
                }
                Err(e) => {
                    warn!("rejected settings update: {}", e);
                    Response::error(e.to_string())
                }
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("FleetGuard daemon starting...");

    let config_path = Config::config_path();
    let config = if config_path.exists() {
        Config::load(&config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}, using defaults", e);
            Config::default()
        })
    } else {
        info!("No config file found, using defaults");
        Config::default()
    };

    let collector = Arc::new(LinuxProcessCollector::new());
    let writer = match ReportWriter::create(config.reports_dir()) {
        Ok(writer) => {
            info!("Reports directory: {:?}", writer.dir());
            Some(writer)
        }
        Err(e) => {
            warn!("Reports disabled, cannot create directory: {}", e);
            None
        }
    };
    let recorder = SessionRecorder::new(
        Arc::clone(&collector) as Arc<dyn ProcessCollector>,
        config.fleet_names(),
        writer,
    );

    let socket_path = SocketServer::socket_path();
    let server = SocketServer::bind(&socket_path).await?;

    let killer: Arc<dyn ProcessKiller> = Arc::new(SignalKiller::new());
    let state = Arc::new(DaemonState {
        enforcer: Enforcer::new(Arc::clone(&collector) as Arc<dyn ProcessCollector>, killer),
        collector,
        recorder,
        settings: SettingsHandle::new(config.clone(), config_path),
        broadcast_tx: server.broadcast_sender(),
        auto_check: Mutex::new(None),
    });
    state.apply_settings(&config).await;
    let handler = Arc::new(Handler(Arc::clone(&state)));

    let mut signals = ShutdownSignals::install()?;
    info!("Daemon ready, listening for connections...");

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Ok(stream) => {
                    let handler = Arc::clone(&handler);
                    let broadcast_rx = server.broadcast_sender().subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, broadcast_rx, handler).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            name = signals.recv() => {
                info!("Shutting down on {}", name);
                break;
            }
        }
    }

    state.recorder.stop(APP_EXIT_REASON).await;
    Ok(())
}
