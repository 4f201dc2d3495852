//! Wire types for the command endpoint.

use serde::{Deserialize, Serialize};

use crate::supervisor::control::SupervisorStatus;
use crate::supervisor::state::WrapperState;

/// Inbound request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandRequest {
    /// Command verb: `restart` or `status`.
    pub command: String,
    /// Restart mode: `graceful` (default) or `hard`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Why the restart was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CommandRequest {
    /// Build a restart request.
    #[must_use]
    pub fn restart(mode: &str, reason: impl Into<String>) -> Self {
        Self {
            command: "restart".into(),
            mode: Some(mode.to_owned()),
            reason: Some(reason.into()),
        }
    }

    /// Build a status request.
    #[must_use]
    pub fn status() -> Self {
        Self {
            command: "status".into(),
            ..Self::default()
        }
    }
}

/// Outbound response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse {
    /// `ok` or `error`.
    pub status: String,
    /// Error message when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Supervisor state (status command only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<WrapperState>,
    /// Conversation latch (status command only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<bool>,
    /// Live agent PID (status command only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_pid: Option<u32>,
    /// Completed restarts (status command only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restarts: Option<u32>,
}

impl CommandResponse {
    /// Plain success.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
            error: None,
            state: None,
            conversation: None,
            agent_pid: None,
            restarts: None,
        }
    }

    /// Structured failure.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
            ..Self::ok()
        }
    }

    /// Success carrying a status snapshot.
    #[must_use]
    pub fn with_status(status: SupervisorStatus) -> Self {
        Self {
            state: Some(status.state),
            conversation: Some(status.conversation),
            agent_pid: status.agent_pid,
            restarts: Some(status.restarts),
            ..Self::ok()
        }
    }

    /// Whether the response reports success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
