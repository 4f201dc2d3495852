//! Starting scheduled missions as independent processes.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::models::mission::Mission;
use crate::{AppError, Result};

/// Starts the OS process that supervises a scheduled mission.
pub trait MissionLauncher: Send + Sync {
    /// Start supervising `mission` headlessly and return the process PID.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the process cannot be started.
    fn launch(&self, mission: &Mission) -> Result<u32>;
}

/// Re-executes this binary as `headless <mission-id>`.
///
/// The child runs in its own process group with null stdio, so it survives
/// the scheduler and is not hit by signals aimed at the scheduler's
/// terminal. Must be called from within a Tokio runtime: each child is
/// reaped by a background task so an exited mission never lingers as a
/// zombie that a liveness probe would report alive.
#[derive(Debug, Clone)]
pub struct ExeLauncher {
    exe: PathBuf,
    config_path: PathBuf,
}

impl ExeLauncher {
    /// Launch missions through `exe`, passing `--config config_path`.
    #[must_use]
    pub fn new(exe: PathBuf, config_path: PathBuf) -> Self {
        Self { exe, config_path }
    }

    /// Launch missions through the currently running executable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the executable path cannot be determined.
    pub fn current(config_path: PathBuf) -> Result<Self> {
        let exe = std::env::current_exe()
            .map_err(|err| AppError::Io(format!("failed to locate current executable: {err}")))?;
        Ok(Self::new(exe, config_path))
    }
}

impl MissionLauncher for ExeLauncher {
    fn launch(&self, mission: &Mission) -> Result<u32> {
        let mut child = Command::new(&self.exe)
            .arg("--config")
            .arg(&self.config_path)
            .arg("headless")
            .arg(&mission.id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|err| {
                AppError::Spawn(format!("failed to launch mission {}: {err}", mission.id))
            })?;

        let pid = child
            .id()
            .ok_or_else(|| AppError::Spawn(format!("mission {} exited at launch", mission.id)))?;

        let mission_id = mission.id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => debug!(mission_id, pid, %status, "mission process reaped"),
                Err(err) => warn!(mission_id, pid, %err, "failed to reap mission process"),
            }
        });

        Ok(pid)
    }
}
