//! Restart state machine for a supervised agent.
//!
//! Pure bookkeeping: the machine never touches a process. Every transition
//! returns the [`ChildAction`] the event loop must carry out, which keeps
//! "at most one live child" a property of this module rather than of the
//! loop's control flow.
//!
//! | state          | event                        | action     | next           |
//! |----------------|------------------------------|------------|----------------|
//! | Running        | hard                         | kill       | Restarting     |
//! | Running        | graceful, idle               | interrupt  | Restarting     |
//! | Running        | graceful, busy               | none       | RestartPending |
//! | RestartPending | agent idle                   | interrupt  | Restarting     |
//! | RestartPending | hard                         | kill       | Restarting     |
//! | RestartPending | graceful                     | none       | RestartPending |
//! | Restarting     | any request                  | none       | Restarting     |
//! | Restarting     | child exits                  | respawn    | Running        |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supervisor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperState {
    /// One agent process is live and no restart is outstanding.
    Running,
    /// A graceful restart waits for the agent to go idle.
    RestartPending,
    /// The old agent has been told to stop; the replacement is not started yet.
    Restarting,
}

impl fmt::Display for WrapperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::RestartPending => "restart_pending",
            Self::Restarting => "restarting",
        })
    }
}

/// Restart strength. `Hard` orders above `Graceful`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartMode {
    /// Wait until the agent is idle, then interrupt it and resume.
    Graceful,
    /// Kill immediately and start a fresh conversation.
    Hard,
}

impl RestartMode {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Graceful => "graceful",
            Self::Hard => "hard",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "graceful" => Some(Self::Graceful),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// A restart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartCommand {
    /// Requested strength.
    pub mode: RestartMode,
    /// Why the restart was requested.
    pub reason: String,
}

impl RestartCommand {
    /// Build a graceful request.
    #[must_use]
    pub fn graceful(reason: impl Into<String>) -> Self {
        Self {
            mode: RestartMode::Graceful,
            reason: reason.into(),
        }
    }

    /// Build a hard request.
    #[must_use]
    pub fn hard(reason: impl Into<String>) -> Self {
        Self {
            mode: RestartMode::Hard,
            reason: reason.into(),
        }
    }

    /// Combine two requests: the stronger wins, ties keep `self`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if other.mode > self.mode {
            other
        } else {
            self
        }
    }
}

/// Agent activity as reported by the idle/busy side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Waiting for input.
    Idle,
    /// Processing a turn.
    Busy,
}

impl Activity {
    /// Parse the side-channel file contents. Unknown text yields `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "idle" => Some(Self::Idle),
            "busy" => Some(Self::Busy),
            _ => None,
        }
    }

    /// Side-channel file contents.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
        }
    }
}

/// What the event loop must do to the live agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildAction {
    /// Nothing.
    None,
    /// Send a polite interrupt.
    Interrupt,
    /// Kill immediately.
    Kill,
}

/// Decision taken when the agent process exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// Start a replacement; `resume` selects the resumed conversation.
    Respawn {
        /// Resume the previous conversation instead of starting fresh.
        resume: bool,
    },
    /// No restart was in flight: the mission is over.
    Finish,
}

/// Restart state machine owned by one supervisor event loop.
#[derive(Debug, Clone)]
pub struct RestartMachine {
    state: WrapperState,
    in_flight: Option<RestartCommand>,
    conversation_exists: bool,
    idle: bool,
}

impl RestartMachine {
    /// Start in `Running` with an idle agent.
    ///
    /// `conversation_exists` is `true` when resuming an existing mission.
    #[must_use]
    pub fn new(conversation_exists: bool) -> Self {
        Self {
            state: WrapperState::Running,
            in_flight: None,
            conversation_exists,
            idle: true,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WrapperState {
        self.state
    }

    /// Whether a resumable conversation exists.
    #[must_use]
    pub fn conversation_exists(&self) -> bool {
        self.conversation_exists
    }

    /// Last observed activity level.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.idle
    }

    /// Pending or converging restart request.
    #[must_use]
    pub fn in_flight(&self) -> Option<&RestartCommand> {
        self.in_flight.as_ref()
    }

    /// Apply a restart request.
    pub fn request(&mut self, command: RestartCommand) -> ChildAction {
        match (self.state, command.mode) {
            (WrapperState::Running | WrapperState::RestartPending, RestartMode::Hard) => {
                self.begin_hard(command)
            }
            (WrapperState::Running, RestartMode::Graceful) if self.idle => {
                self.state = WrapperState::Restarting;
                self.in_flight = Some(command);
                ChildAction::Interrupt
            }
            (WrapperState::Running, RestartMode::Graceful) => {
                self.state = WrapperState::RestartPending;
                self.in_flight = Some(command);
                ChildAction::None
            }
            (WrapperState::RestartPending | WrapperState::Restarting, _) => ChildAction::None,
        }
    }

    fn begin_hard(&mut self, command: RestartCommand) -> ChildAction {
        self.state = WrapperState::Restarting;
        self.in_flight = Some(command);
        self.conversation_exists = false;
        ChildAction::Kill
    }

    /// Record an idle/busy observation and apply any deferred restart.
    pub fn observe(&mut self, activity: Activity) -> ChildAction {
        if self.state == WrapperState::Restarting {
            // The outgoing agent's last words are not about the next one.
            return ChildAction::None;
        }

        self.idle = activity == Activity::Idle;
        if activity == Activity::Busy {
            self.conversation_exists = true;
        }

        if self.state == WrapperState::RestartPending && self.idle {
            self.state = WrapperState::Restarting;
            return ChildAction::Interrupt;
        }
        ChildAction::None
    }

    /// Decide what happens after the agent process exited.
    ///
    /// A deferred graceful restart counts as in flight: the agent stopped on
    /// its own, which is the point the restart was waiting for.
    pub fn child_exited(&mut self) -> ExitDecision {
        match self.state {
            WrapperState::Restarting | WrapperState::RestartPending => {
                self.state = WrapperState::Running;
                self.in_flight = None;
                self.idle = true;
                ExitDecision::Respawn {
                    resume: self.conversation_exists,
                }
            }
            WrapperState::Running => ExitDecision::Finish,
        }
    }
}
