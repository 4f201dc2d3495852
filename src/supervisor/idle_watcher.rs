//! Idle/busy side-channel watcher.
//!
//! The agent writes `idle` or `busy` to the mission's state file. This module
//! watches the containing directory with `notify`, debounces bursts of
//! events, and wakes the event loop through a capacity-1 channel. The loop
//! re-reads the file on wake-up, so a wake-up that collapses several changes
//! still yields the current level. A `busy` seen while events are collapsed
//! is latched separately so a short turn still marks the conversation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use super::state::Activity;
use crate::{AppError, Result};

/// Keeps the file watcher and its debounce task alive.
pub struct IdleWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    busy_seen: Arc<AtomicBool>,
}

impl IdleWatcher {
    /// Start watching `state_file`; wake-ups are sent to `wake`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the watcher cannot be created or the
    /// file's directory cannot be watched.
    pub fn spawn(
        state_file: &Path,
        debounce: Duration,
        wake: mpsc::Sender<()>,
        ct: CancellationToken,
    ) -> Result<Self> {
        let dir = state_file
            .parent()
            .ok_or_else(|| AppError::Io("state file has no parent directory".into()))?
            .to_owned();
        let file_name = state_file
            .file_name()
            .ok_or_else(|| AppError::Io("state file has no file name".into()))?
            .to_owned();

        let busy_seen = Arc::new(AtomicBool::new(false));
        let latch = Arc::clone(&busy_seen);
        let watched = state_file.to_owned();

        let (raw_tx, mut raw_rx) = mpsc::channel::<()>(1);
        let mut watcher = notify::recommended_watcher(
            move |result: std::result::Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let relevant = is_content_event(&event)
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().is_some_and(|name| name == file_name.as_os_str()));
                    if relevant {
                        if read_activity(&watched) == Some(Activity::Busy) {
                            latch.store(true, Ordering::SeqCst);
                        }
                        let _ = raw_tx.try_send(());
                    }
                }
                Err(err) => warn!(%err, "state file watcher error"),
            },
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let path = state_file.to_owned();
        let task = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        () = ct.cancelled() => break,
                        received = raw_rx.recv() => {
                            if received.is_none() {
                                break;
                            }
                            tokio::time::sleep(debounce).await;
                            while raw_rx.try_recv().is_ok() {}
                            debug!(path = %path.display(), "agent state changed");
                            let _ = wake.try_send(());
                        }
                    }
                }
            }
            .instrument(info_span!("idle_watcher")),
        );

        Ok(Self {
            _watcher: watcher,
            task,
            busy_seen,
        })
    }

    /// Whether `busy` was observed since the last call, clearing the latch.
    #[must_use]
    pub fn take_busy_seen(&self) -> bool {
        self.busy_seen.swap(false, Ordering::SeqCst)
    }
}

impl Drop for IdleWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn is_content_event(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Current activity level, or `None` if the file is missing or unrecognised.
#[must_use]
pub fn read_activity(state_file: &Path) -> Option<Activity> {
    fs::read_to_string(state_file)
        .ok()
        .and_then(|raw| Activity::parse(&raw))
}

/// Write an activity marker, replacing the file atomically.
///
/// # Errors
///
/// Returns `AppError::Io` if the marker cannot be written.
pub fn write_activity(state_file: &Path, activity: Activity) -> Result<()> {
    let tmp: PathBuf = state_file.with_extension("tmp");
    fs::write(&tmp, activity.as_str())
        .and_then(|()| fs::rename(&tmp, state_file))
        .map_err(|err| {
            AppError::Io(format!(
                "failed to write state marker {}: {err}",
                state_file.display()
            ))
        })
}
