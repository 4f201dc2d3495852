//! Per-mission PID file.
//!
//! The file's presence is the authoritative "this mission is running" witness.
//! [`PidFile`] removes it when dropped, so every supervisor exit path clears
//! it, including early returns on error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{AppError, Result};

/// Owned PID file, removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write `pid` to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be written.
    pub fn create(path: &Path, pid: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::Io(format!("failed to create {}: {err}", parent.display()))
            })?;
        }
        fs::write(path, format!("{pid}\n"))
            .map_err(|err| AppError::Io(format!("failed to write pid file: {err}")))?;
        debug!(path = %path.display(), pid, "pid file written");
        Ok(Self {
            path: path.to_owned(),
        })
    }

    /// Location of the PID file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "pid file removed"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %self.path.display(), %err, "failed to remove pid file"),
        }
    }
}

/// Read the PID recorded at `path`.
///
/// Returns `Ok(None)` when the file does not exist, i.e. the mission is not
/// running.
///
/// # Errors
///
/// Returns `AppError::Io` if the file exists but cannot be read or parsed.
pub fn read_pid(path: &Path) -> Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|err| AppError::Io(format!("malformed pid file {}: {err}", path.display()))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(AppError::Io(format!(
            "failed to read pid file {}: {err}",
            path.display()
        ))),
    }
}
