//! Where the scheduler gets its job table from.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::config::{CronConfig, GlobalConfig};

/// Provides the current scheduler settings and job table.
pub trait JobSource: Send + Sync {
    /// Current snapshot. Called once per scheduler cycle.
    fn snapshot(&self) -> CronConfig;
}

/// Fixed job table.
#[derive(Debug, Clone)]
pub struct StaticJobSource {
    config: CronConfig,
}

impl StaticJobSource {
    /// Wrap a job table.
    #[must_use]
    pub fn new(config: CronConfig) -> Self {
        Self { config }
    }
}

impl JobSource for StaticJobSource {
    fn snapshot(&self) -> CronConfig {
        self.config.clone()
    }
}

/// Re-reads the config file on every snapshot so job edits apply without a
/// daemon restart. A file that fails to load leaves the last good snapshot
/// in effect.
#[derive(Debug)]
pub struct FileJobSource {
    path: PathBuf,
    last_good: Mutex<CronConfig>,
}

impl FileJobSource {
    /// Watch `path`, starting from an already loaded snapshot.
    #[must_use]
    pub fn new(path: PathBuf, initial: CronConfig) -> Self {
        Self {
            path,
            last_good: Mutex::new(initial),
        }
    }
}

impl JobSource for FileJobSource {
    fn snapshot(&self) -> CronConfig {
        let mut last_good = self
            .last_good
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match GlobalConfig::load_from_path(&self.path) {
            Ok(config) => {
                *last_good = config.cron;
            }
            Err(err) => {
                warn!(path = %self.path.display(), %err, "config reload failed, keeping previous jobs");
            }
        }
        last_good.clone()
    }
}
