//! Credential synchronisation between the shared agent config scope and the
//! per-mission scope.
//!
//! Before each agent launch the shared credentials are pulled into the
//! mission scope so a rotated token reaches the new process. On exit the
//! mission's copy is pushed back when it is newer, so a token the agent
//! refreshed during the mission is not lost. Both directions compare content
//! hashes and skip identical files.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::config::AgentConfig;
use crate::models::mission::MissionPaths;
use crate::{AppError, Result};

/// Result of one synchronisation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The destination was replaced.
    Copied,
    /// Both sides already match, or the destination is newer.
    Unchanged,
    /// Nothing to do: no shared scope configured or no source file.
    Skipped,
}

/// Copies one credentials file between two scopes.
#[derive(Debug, Clone)]
pub struct CredentialSync {
    shared: Option<PathBuf>,
    mission: PathBuf,
}

impl CredentialSync {
    /// Derive both file locations from the agent config and mission layout.
    #[must_use]
    pub fn new(agent: &AgentConfig, paths: &MissionPaths) -> Self {
        Self {
            shared: agent
                .shared_config_dir
                .as_ref()
                .map(|dir| dir.join(&agent.credentials_file)),
            mission: paths.config_dir.join(&agent.credentials_file),
        }
    }

    /// Explicit file locations.
    #[must_use]
    pub fn between(shared: Option<PathBuf>, mission: PathBuf) -> Self {
        Self { shared, mission }
    }

    /// Shared scope into mission scope, whenever the contents differ.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if a file cannot be read or written.
    pub fn pull(&self) -> Result<SyncOutcome> {
        let Some(ref shared) = self.shared else {
            return Ok(SyncOutcome::Skipped);
        };
        copy_if_changed(shared, &self.mission, false)
    }

    /// Mission scope back into the shared scope, when the mission's copy is
    /// newer and differs.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if a file cannot be read or written.
    pub fn push(&self) -> Result<SyncOutcome> {
        let Some(ref shared) = self.shared else {
            return Ok(SyncOutcome::Skipped);
        };
        copy_if_changed(&self.mission, shared, true)
    }
}

fn copy_if_changed(from: &Path, to: &Path, require_newer: bool) -> Result<SyncOutcome> {
    let Some(source) = read_optional(from)? else {
        return Ok(SyncOutcome::Skipped);
    };

    if let Some(existing) = read_optional(to)? {
        if digest(&existing) == digest(&source) {
            return Ok(SyncOutcome::Unchanged);
        }
        if require_newer && modified(to)? > modified(from)? {
            return Ok(SyncOutcome::Unchanged);
        }
    }

    write_private(to, &source)?;
    Ok(SyncOutcome::Copied)
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(AppError::Io(format!(
            "failed to read credentials {}: {err}",
            path.display()
        ))),
    }
}

fn modified(path: &Path) -> Result<SystemTime> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|err| AppError::Io(format!("failed to stat {}: {err}", path.display())))
}

fn digest(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Write via a sibling temp file and rename, readable by the owner only.
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| AppError::Io(format!("failed to create {}: {err}", parent.display())))?;
    }
    let tmp = path.with_extension("sync-tmp");
    fs::write(&tmp, bytes)
        .and_then(|()| fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)))
        .and_then(|()| fs::rename(&tmp, path))
        .map_err(|err| {
            AppError::Io(format!(
                "failed to write credentials {}: {err}",
                path.display()
            ))
        })
}
