//! Configuration management (TOML)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub limits: LimitsConfig,
    pub policy: PolicyConfig,
    pub monitoring: MonitoringConfig,
    pub fleet: FleetConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_memory_for_instance_mb: u64,
    pub max_age_for_instance_minutes: u64,
    pub max_memory_for_orchestrator_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub kill_old: bool,
    pub kill_heavy: bool,
    pub kill_main: bool,
    /// 0 disables periodic enforcement.
    pub auto_check_interval_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_resource_monitoring: bool,
    pub monitoring_interval_minutes: u64,
    /// Empty means `reports/` beside the executable.
    pub reports_dir: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub worker_process_name: String,
    pub orchestrator_process_name: String,
    pub task_queue_dir: String,
    pub task_queue_file: String,
    pub task_queue_backup_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub show_logs: bool,
    pub show_raw_command_line: bool,
    pub notifications: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_memory_for_instance_mb: 1000,
            max_age_for_instance_minutes: 30,
            max_memory_for_orchestrator_mb: 20000,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kill_old: true,
            kill_heavy: true,
            kill_main: false,
            auto_check_interval_minutes: 0,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_resource_monitoring: true,
            monitoring_interval_minutes: 1,
            reports_dir: String::new(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            worker_process_name: "zbe1".to_string(),
            orchestrator_process_name: "ZennoPoster".to_string(),
            task_queue_dir: String::new(),
            task_queue_file: "Tasks.dat".to_string(),
            task_queue_backup_file: "Tasks.1.dat".to_string(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_logs: false,
            show_raw_command_line: false,
            notifications: true,
        }
    }
}

/// Age and memory limits used by classification and enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub max_age_minutes: u64,
    pub max_memory_mb: u64,
    pub max_orchestrator_memory_mb: u64,
}

/// Which enforcement actions are enabled, plus the limits they apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementPolicy {
    pub thresholds: Thresholds,
    pub kill_old: bool,
    pub kill_heavy: bool,
    pub kill_main: bool,
}

/// Process names that make up the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetNames {
    pub worker: String,
    pub orchestrator: String,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitoring.monitoring_interval_minutes == 0 {
            return Err(ConfigError::Invalid(
                "monitoring_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.fleet.worker_process_name.trim().is_empty()
            || self.fleet.orchestrator_process_name.trim().is_empty()
        {
            return Err(ConfigError::Invalid("process names must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "fleetguard")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            max_age_minutes: self.limits.max_age_for_instance_minutes,
            max_memory_mb: self.limits.max_memory_for_instance_mb,
            max_orchestrator_memory_mb: self.limits.max_memory_for_orchestrator_mb,
        }
    }

    pub fn policy(&self) -> EnforcementPolicy {
        EnforcementPolicy {
            thresholds: self.thresholds(),
            kill_old: self.policy.kill_old,
            kill_heavy: self.policy.kill_heavy,
            kill_main: self.policy.kill_main,
        }
    }

    pub fn fleet_names(&self) -> FleetNames {
        FleetNames {
            worker: self.fleet.worker_process_name.clone(),
            orchestrator: self.fleet.orchestrator_process_name.clone(),
        }
    }

    pub fn reports_dir(&self) -> PathBuf {
        if !self.monitoring.reports_dir.is_empty() {
            return PathBuf::from(&self.monitoring.reports_dir);
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reports")
    }

    pub fn task_queue_dir(&self) -> PathBuf {
        if !self.fleet.task_queue_dir.is_empty() {
            return PathBuf::from(&self.fleet.task_queue_dir);
        }
        directories::BaseDirs::new()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ZennoLab")
            .join("ZennoPoster")
            .join("7")
            .join("ZennoPoster")
    }
}

/// The live configuration plus the file it is persisted to.
///
/// Readers take an immutable snapshot; editors work on an owned draft that
/// only replaces the live value once it has been validated and saved.
pub struct SettingsHandle {
    live: RwLock<Arc<Config>>,
    path: PathBuf,
}

impl SettingsHandle {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            live: RwLock::new(Arc::new(config)),
            path,
        }
    }

    pub async fn current(&self) -> Arc<Config> {
        Arc::clone(&*self.live.read().await)
    }

    pub async fn draft(&self) -> Config {
        self.live.read().await.as_ref().clone()
    }

    /// Validates and saves `draft`, then swaps it in. On error the live
    /// configuration is untouched.
    pub async fn commit(&self, draft: Config) -> Result<Arc<Config>, ConfigError> {
        draft.validate()?;
        let mut live = self.live.write().await;
        draft.save(&self.path)?;
        let committed = Arc::new(draft);
        *live = Arc::clone(&committed);
        Ok(committed)
    }
}
