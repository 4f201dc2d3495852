//! Structured supervisor diagnostics.
//!
//! The supervisor reports lifecycle events through the narrow
//! [`MissionJournal`] capability. The primary implementation,
//! [`JsonlJournalWriter`], appends JSONL records to the mission's
//! `wrapper.jsonl`.

pub mod writer;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event classification for journal entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JournalEventType {
    /// Supervisor started.
    SupervisorStart,
    /// Agent process started.
    AgentSpawned,
    /// Restart command received.
    RestartRequested,
    /// Graceful restart deferred until the agent is idle.
    RestartDeferred,
    /// Restart action (interrupt or kill) sent to the agent.
    RestartApplied,
    /// OS signal forwarded to the agent.
    SignalForwarded,
    /// Agent process exited.
    AgentExited,
    /// Credential synchronisation between scopes.
    CredentialSync,
    /// Headless run exceeded its time budget.
    Timeout,
    /// Polite shutdown did not finish within the grace window.
    ForcedKill,
    /// Supervisor finished.
    SupervisorExit,
}

/// One structured journal record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    /// ISO 8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Mission the event belongs to.
    pub mission_id: String,
    /// Event classification.
    pub event_type: JournalEventType,
    /// Agent PID, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Restart mode, when relevant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Free-form reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Exit code, for exit events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl JournalEntry {
    /// Construct a minimal entry for the given event type.
    #[must_use]
    pub fn new(mission_id: &str, event_type: JournalEventType) -> Self {
        Self {
            timestamp: Utc::now(),
            mission_id: mission_id.to_owned(),
            event_type,
            pid: None,
            mode: None,
            reason: None,
            exit_code: None,
        }
    }

    /// Set the agent PID.
    #[must_use]
    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Set the restart mode.
    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the exit code.
    #[must_use]
    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }
}

/// Writes journal entries to a persistent store.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`].
pub trait MissionJournal: Send + Sync {
    /// Record a single entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn log_entry(&self, entry: JournalEntry) -> crate::Result<()>;
}

pub use writer::JsonlJournalWriter;
