//! Hand-off points between background tasks and the supervisor event loop.
//!
//! Restart requests land in a [`CommandInbox`]: a single mutex-guarded slot
//! where a hard request replaces a graceful one and anything else is
//! absorbed. Submitting also wakes the loop through a capacity-1 channel with
//! a non-blocking send, so a burst of requests collapses into one wake-up and
//! the submitter never waits on the loop.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use super::state::{RestartCommand, WrapperState};

/// Single-slot restart request mailbox.
#[derive(Debug)]
pub struct CommandInbox {
    slot: Mutex<Option<RestartCommand>>,
    wake: mpsc::Sender<()>,
}

impl CommandInbox {
    /// Create an inbox and the receiver the event loop selects on.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::Receiver<()>) {
        let (wake, rx) = mpsc::channel(1);
        (
            Arc::new(Self {
                slot: Mutex::new(None),
                wake,
            }),
            rx,
        )
    }

    /// Merge `command` into the slot and wake the loop.
    pub fn submit(&self, command: RestartCommand) {
        {
            let mut slot = self
                .slot
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *slot = Some(match slot.take() {
                Some(existing) => existing.merge(command),
                None => command,
            });
        }
        // Full means a wake-up is already queued; the slot holds the merge.
        let _ = self.wake.try_send(());
    }

    /// Drain the slot.
    #[must_use]
    pub fn take(&self) -> Option<RestartCommand> {
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }
}

/// Snapshot of the supervisor published for the command endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupervisorStatus {
    /// Restart state.
    pub state: WrapperState,
    /// Whether a resumable conversation exists.
    pub conversation: bool,
    /// PID of the live agent, if any.
    pub agent_pid: Option<u32>,
    /// Completed restarts.
    pub restarts: u32,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self {
            state: WrapperState::Running,
            conversation: false,
            agent_pid: None,
            restarts: 0,
        }
    }
}

/// What the command endpoint needs from a supervisor.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    /// Restart mailbox.
    pub inbox: Arc<CommandInbox>,
    /// Latest published status.
    pub status: watch::Receiver<SupervisorStatus>,
}
