//! Signal-based process liveness and signalling.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::{AppError, Result};

/// Signals the orchestrator sends to agent and mission processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Polite interrupt (`SIGINT`), used for graceful restarts.
    Interrupt,
    /// Polite terminate (`SIGTERM`).
    Terminate,
    /// Terminal hang-up (`SIGHUP`).
    Hangup,
    /// Forced kill (`SIGKILL`).
    Kill,
}

impl ProcessSignal {
    fn as_nix(self) -> Signal {
        match self {
            Self::Interrupt => Signal::SIGINT,
            Self::Terminate => Signal::SIGTERM,
            Self::Hangup => Signal::SIGHUP,
            Self::Kill => Signal::SIGKILL,
        }
    }

    /// Conventional signal name, used in logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.as_nix().as_str()
    }
}

/// Liveness check and signal delivery for OS processes.
pub trait ProcessProbe: Send + Sync {
    /// Whether a process with this PID currently exists.
    fn is_alive(&self, pid: u32) -> bool;

    /// Deliver `signal` to `pid`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the signal cannot be delivered.
    fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<()>;
}

/// [`ProcessProbe`] backed by `kill(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl ProcessProbe for SignalProbe {
    fn is_alive(&self, pid: u32) -> bool {
        is_alive(pid)
    }

    fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<()> {
        send_signal(pid, signal)
    }
}

fn to_pid(pid: u32) -> Option<Pid> {
    // 0 and negative values address process groups, never a single process.
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Zero-signal probe: `ESRCH` means gone, `EPERM` means alive but not ours.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };

    match kill(pid, None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send `signal` to a single process.
///
/// # Errors
///
/// Returns `AppError::Process` for invalid PIDs or when `kill(2)` fails,
/// including when the process has already exited.
pub fn send_signal(pid: u32, signal: ProcessSignal) -> Result<()> {
    let target =
        to_pid(pid).ok_or_else(|| AppError::Process(format!("invalid pid {pid}")))?;

    kill(target, signal.as_nix())
        .map_err(|err| AppError::Process(format!("failed to send {} to {pid}: {err}", signal.name())))
}
