//! Global configuration parsing and validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// How the agent CLI is launched for each flavour of mission.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary (e.g., `claude`).
    pub cli: String,
    /// Arguments passed on every launch.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra arguments that make the agent resume its previous conversation.
    #[serde(default = "default_resume_args")]
    pub resume_args: Vec<String>,
    /// Extra arguments for non-interactive runs; the prompt is appended last.
    #[serde(default = "default_headless_args")]
    pub headless_args: Vec<String>,
    /// Environment variable pointing the agent at its per-mission config dir.
    #[serde(default)]
    pub config_dir_env: Option<String>,
    /// Shared agent config directory holding the canonical credentials.
    #[serde(default)]
    pub shared_config_dir: Option<PathBuf>,
    /// Credentials file name inside both config scopes.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
}

fn default_resume_args() -> Vec<String> {
    vec!["--continue".into()]
}

fn default_headless_args() -> Vec<String> {
    vec!["--print".into()]
}

fn default_credentials_file() -> String {
    ".credentials.json".into()
}

/// Tuning for the per-mission supervisor.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SupervisorConfig {
    /// Interval between heartbeat writes to the mission store.
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
    /// Quiet period applied to idle/busy file events.
    #[serde(default = "default_idle_debounce_ms")]
    pub idle_debounce_ms: u64,
    /// Grace window between a polite signal and a forced kill.
    #[serde(default = "default_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// Size threshold at which the headless output log rotates.
    #[serde(default = "default_log_max_bytes")]
    pub log_max_bytes: u64,
    /// Number of rotated output logs retained.
    #[serde(default = "default_log_backups")]
    pub log_backups: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            heartbeat_seconds: default_heartbeat_seconds(),
            idle_debounce_ms: default_idle_debounce_ms(),
            shutdown_grace_seconds: default_grace_seconds(),
            log_max_bytes: default_log_max_bytes(),
            log_backups: default_log_backups(),
        }
    }
}

impl SupervisorConfig {
    /// Heartbeat period.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }

    /// Idle watcher debounce window.
    #[must_use]
    pub fn idle_debounce(&self) -> Duration {
        Duration::from_millis(self.idle_debounce_ms)
    }

    /// Escalation grace window.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

fn default_heartbeat_seconds() -> u64 {
    30
}

fn default_idle_debounce_ms() -> u64 {
    250
}

fn default_grace_seconds() -> u64 {
    10
}

fn default_log_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_log_backups() -> u32 {
    3
}

/// Whether a scheduled run may start while a previous run is alive.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Never run two instances of the same job concurrently.
    #[default]
    Skip,
    /// Start a new instance regardless of running ones.
    Allow,
}

/// A single scheduled job.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CronJobConfig {
    /// Five-field cron expression or `@macro`. Parsed per cycle.
    pub schedule: String,
    /// Instruction handed to the headless agent.
    pub prompt: String,
    /// Overlap policy for this job.
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Disabled jobs are never evaluated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overall time budget for one run.
    #[serde(default)]
    pub timeout_minutes: Option<u64>,
    /// Directory the agent runs in; defaults to the mission directory.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

impl CronJobConfig {
    /// Time budget for one run, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_minutes
            .filter(|m| *m > 0)
            .map(minutes)
    }
}

/// `count` minutes as a duration, saturating rather than overflowing.
#[must_use]
pub fn minutes(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(60))
}

fn default_true() -> bool {
    true
}

/// Scheduler settings plus the job table.
///
/// Each `[cron.jobs.<name>]` table is decoded on its own: a table that does
/// not decode lands in [`CronConfig::invalid_jobs`] and the rest of the file
/// still loads.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(from = "RawCronConfig")]
pub struct CronConfig {
    /// Global cap on concurrently tracked scheduled missions.
    pub max_concurrent: u32,
    /// Scheduler tick period.
    pub tick_seconds: u64,
    /// Grace window used when stopping tracked missions. Longer than the
    /// supervisor's own window so a supervisor can stop its agent first.
    pub shutdown_grace_seconds: u64,
    /// Jobs keyed by name.
    pub jobs: BTreeMap<String, CronJobConfig>,
    /// Job tables that failed to decode, with the decode error.
    pub invalid_jobs: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
struct RawCronConfig {
    #[serde(default = "default_max_concurrent")]
    max_concurrent: u32,
    #[serde(default = "default_tick_seconds")]
    tick_seconds: u64,
    #[serde(default = "default_cron_grace_seconds")]
    shutdown_grace_seconds: u64,
    #[serde(default)]
    jobs: BTreeMap<String, toml::Value>,
}

impl From<RawCronConfig> for CronConfig {
    fn from(raw: RawCronConfig) -> Self {
        let mut jobs = BTreeMap::new();
        let mut invalid_jobs = BTreeMap::new();
        for (name, table) in raw.jobs {
            match table.try_into::<CronJobConfig>() {
                Ok(job) => {
                    jobs.insert(name, job);
                }
                Err(err) => {
                    invalid_jobs.insert(name, err.message().to_owned());
                }
            }
        }
        Self {
            max_concurrent: raw.max_concurrent,
            tick_seconds: raw.tick_seconds,
            shutdown_grace_seconds: raw.shutdown_grace_seconds,
            jobs,
            invalid_jobs,
        }
    }
}

impl Default for CronConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            tick_seconds: default_tick_seconds(),
            shutdown_grace_seconds: default_cron_grace_seconds(),
            jobs: BTreeMap::new(),
            invalid_jobs: BTreeMap::new(),
        }
    }
}

impl CronConfig {
    /// Scheduler tick period.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_seconds)
    }

    /// Grace window used by scheduler shutdown.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_tick_seconds() -> u64 {
    60
}

fn default_cron_grace_seconds() -> u64 {
    15
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Root for mission directories and the mission database.
    pub data_dir: PathBuf,
    /// Agent launch settings.
    pub agent: AgentConfig,
    /// Supervisor tuning.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Scheduler settings and jobs.
    #[serde(default)]
    pub cron: CronConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the mission database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("missions.db")
    }

    /// Parent of all mission directories.
    #[must_use]
    pub fn missions_root(&self) -> PathBuf {
        self.data_dir.join("missions")
    }

    /// Directory that holds everything belonging to one mission.
    #[must_use]
    pub fn mission_dir(&self, mission_id: &str) -> PathBuf {
        self.missions_root().join(mission_id)
    }

    fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(AppError::Config("data_dir must not be empty".into()));
        }

        if self.agent.cli.trim().is_empty() {
            return Err(AppError::Config("agent.cli must not be empty".into()));
        }

        if self.cron.max_concurrent == 0 {
            return Err(AppError::Config(
                "cron.max_concurrent must be greater than zero".into(),
            ));
        }

        if self.cron.tick_seconds == 0 {
            return Err(AppError::Config(
                "cron.tick_seconds must be greater than zero".into(),
            ));
        }

        if self.supervisor.heartbeat_seconds == 0 {
            return Err(AppError::Config(
                "supervisor.heartbeat_seconds must be greater than zero".into(),
            ));
        }

        if self.supervisor.log_max_bytes == 0 {
            return Err(AppError::Config(
                "supervisor.log_max_bytes must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
