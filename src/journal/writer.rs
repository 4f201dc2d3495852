//! Append-only JSONL journal writer.

use std::{
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Mutex,
};

use tracing::warn;

use super::{JournalEntry, MissionJournal};
use crate::{AppError, Result};

/// Appends one JSON object per line to a single journal file.
///
/// The file is opened lazily on the first write and kept open afterwards.
pub struct JsonlJournalWriter {
    path: PathBuf,
    writer: Mutex<Option<BufWriter<fs::File>>>,
}

impl JsonlJournalWriter {
    /// Construct a writer for `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the directory cannot be created.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Io(format!(
                    "failed to create journal directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(Self {
            path,
            writer: Mutex::new(None),
        })
    }

    fn open(&self) -> Result<BufWriter<fs::File>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                AppError::Io(format!("failed to open journal {}: {e}", self.path.display()))
            })?;
        Ok(BufWriter::new(file))
    }
}

impl MissionJournal for JsonlJournalWriter {
    fn log_entry(&self, entry: JournalEntry) -> Result<()> {
        let mut guard = self
            .writer
            .lock()
            .map_err(|_| AppError::Io("journal writer mutex poisoned".to_string()))?;

        if guard.is_none() {
            *guard = Some(self.open()?);
        }

        if let Some(writer) = guard.as_mut() {
            let line = serde_json::to_string(&entry)
                .map_err(|e| AppError::Io(format!("failed to serialize journal entry: {e}")))?;
            if let Err(e) = writeln!(writer, "{line}") {
                warn!("failed to write journal entry: {e}");
                return Err(AppError::Io(format!("journal write failed: {e}")));
            }
            if let Err(e) = writer.flush() {
                warn!("failed to flush journal: {e}");
                return Err(AppError::Io(format!("journal flush failed: {e}")));
            }
        }

        Ok(())
    }
}
