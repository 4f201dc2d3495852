//! Size-rotated capture file for headless agent output.
//!
//! `output.log` rotates to `output.log.1` once it would exceed the size
//! threshold; older backups shift up and the one past the retention count is
//! deleted.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::{AppError, Result};

/// Append-only log file with size-based rotation.
#[derive(Debug)]
pub struct RotatingLog {
    path: PathBuf,
    max_bytes: u64,
    backups: u32,
    file: File,
    written: u64,
}

impl RotatingLog {
    /// Open (appending) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be opened.
    pub fn open(path: &Path, max_bytes: u64, backups: u32) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(path)?;
        let written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            path: path.to_owned(),
            max_bytes,
            backups,
            file,
            written,
        })
    }

    /// Append `buf`, rotating first if it would push the file past the limit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if writing or rotating fails.
    pub fn write_chunk(&mut self, buf: &[u8]) -> Result<()> {
        let len = buf.len() as u64;
        if self.written > 0 && self.written + len > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += len;
        Ok(())
    }

    /// Path of the `n`-th backup.
    #[must_use]
    pub fn backup_path(&self, n: u32) -> PathBuf {
        backup_path(&self.path, n)
    }

    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;
        if self.backups == 0 {
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        remove_if_exists(&backup_path(&self.path, self.backups))?;
        for n in (1..self.backups).rev() {
            let from = backup_path(&self.path, n);
            if from.exists() {
                fs::rename(&from, backup_path(&self.path, n + 1))?;
            }
        }
        fs::rename(&self.path, backup_path(&self.path, 1))?;
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn backup_path(path: &Path, n: u32) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| AppError::Io(format!("failed to open {}: {err}", path.display())))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Copy everything from `reader` into the shared log until EOF.
pub fn spawn_pump<R>(mut reader: R, log: Arc<Mutex<RotatingLog>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0_u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let written = log
                        .lock()
                        .map_err(|_| AppError::Io("output log mutex poisoned".into()))
                        .and_then(|mut log| log.write_chunk(&buf[..n]));
                    if let Err(err) = written {
                        warn!(%err, "failed to capture agent output");
                    }
                }
                Err(err) => {
                    warn!(%err, "agent output stream failed");
                    break;
                }
            }
        }
    })
}
