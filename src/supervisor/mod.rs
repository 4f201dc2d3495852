//! Per-mission agent supervisor.
//!
//! [`MissionSupervisor`] owns one mission's agent process from spawn to
//! exit. Interactive missions ([`MissionSupervisor::run`]) are driven by a
//! single event loop that selects over OS signals, cancellation, restart
//! commands, idle/busy notifications and the child's exit. Background
//! watchers only ever wake the loop through capacity-1 channels; all process
//! handles and the [`state::RestartMachine`] are owned by the loop alone.
//!
//! Headless missions ([`MissionSupervisor::run_headless`]) run a single
//! non-interactive instruction with captured output and an optional time
//! budget.

pub mod control;
pub mod credentials;
pub mod heartbeat;
pub mod idle_watcher;
pub mod launcher;
pub mod output_log;
pub mod state;

use std::fmt;
use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::process::Child;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{GlobalConfig, SupervisorConfig};
use crate::ipc::server::spawn_command_server;
use crate::journal::{JournalEntry, JournalEventType, JsonlJournalWriter, MissionJournal};
use crate::models::mission::{Mission, MissionPaths};
use crate::persistence::mission_repo::MissionRepo;
use crate::process::{send_signal, PidFile, ProcessSignal};
use crate::{AppError, Result};

use self::control::{CommandInbox, ControlHandle, SupervisorStatus};
use self::credentials::{CredentialSync, SyncOutcome};
use self::heartbeat::spawn_heartbeat;
use self::idle_watcher::{read_activity, write_activity, IdleWatcher};
use self::launcher::{AgentLauncher, CliLauncher, LaunchMode};
use self::output_log::{spawn_pump, RotatingLog};
use self::state::{Activity, ChildAction, ExitDecision, RestartMachine, WrapperState};

/// Why the supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The agent exited with no restart in flight.
    ChildExited,
    /// An OS signal was received and forwarded to the agent.
    Signal(&'static str),
    /// The parent cancellation token fired.
    Cancelled,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChildExited => f.write_str("child exited"),
            Self::Signal(name) => write!(f, "signal {name}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Final result of a supervised mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionOutcome {
    /// Exit code of the last agent process; `None` if it died by signal.
    pub exit_code: Option<i32>,
    /// Completed restarts.
    pub restarts: u32,
    /// Why supervision ended.
    pub reason: ExitReason,
}

/// Options for a headless run.
#[derive(Debug, Clone, Default)]
pub struct HeadlessOptions {
    /// Overall time budget.
    pub timeout: Option<Duration>,
    /// Scheduler run identifier, for log correlation.
    pub job_id: Option<String>,
    /// Cron job name, for log correlation.
    pub job_name: Option<String>,
}

/// Supervises the agent process of one mission.
pub struct MissionSupervisor {
    mission: Mission,
    paths: MissionPaths,
    config: SupervisorConfig,
    repo: MissionRepo,
    launcher: Arc<dyn AgentLauncher>,
    journal: Arc<dyn MissionJournal>,
    credentials: CredentialSync,
    cancel: CancellationToken,
}

impl MissionSupervisor {
    /// Prepare a supervisor with the production launcher and journal.
    ///
    /// Creates the mission and workspace directories.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the mission directories cannot be created.
    pub fn new(
        mission: Mission,
        config: &GlobalConfig,
        repo: MissionRepo,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let paths = mission.paths();
        fs::create_dir_all(&paths.config_dir)?;
        fs::create_dir_all(&mission.workspace_root)?;

        Ok(Self {
            credentials: CredentialSync::new(&config.agent, &paths),
            journal: Arc::new(JsonlJournalWriter::new(paths.journal.clone())?),
            launcher: Arc::new(CliLauncher::new(config.agent.clone())),
            config: config.supervisor.clone(),
            paths,
            mission,
            repo,
            cancel,
        })
    }

    /// Replace the agent launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn AgentLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replace the diagnostic journal.
    #[must_use]
    pub fn with_journal(mut self, journal: Arc<dyn MissionJournal>) -> Self {
        self.journal = journal;
        self
    }

    /// Mission being supervised.
    #[must_use]
    pub fn mission(&self) -> &Mission {
        &self.mission
    }

    /// Supervise an interactive agent until it exits on its own, a signal
    /// arrives, or the supervisor is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails (PID file, watchers, command
    /// endpoint, first spawn) or if a replacement agent cannot be spawned
    /// after a restart. The PID file is removed in every case.
    pub async fn run(&self, is_resume: bool) -> Result<MissionOutcome> {
        let span = info_span!("supervisor", mission_id = %self.mission.id, mode = "interactive");
        async move {
            let _pid_file = self.claim().await?;
            if let Err(err) = write_activity(&self.paths.state_file, Activity::Idle) {
                warn!(%err, "failed to write initial idle marker");
            }

            let result = self.interactive_loop(is_resume).await;
            self.finalize(&result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Run the mission's prompt once, non-interactively.
    ///
    /// Output goes to the mission's rotating `output.log`. The run races
    /// natural completion against OS signals, cancellation and the optional
    /// time budget; the latter three escalate from `SIGTERM` to `SIGKILL`
    /// after the grace window.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Timeout` when the time budget is exhausted,
    /// `AppError::Config` if the mission has no prompt, or any startup error.
    pub async fn run_headless(
        &self,
        is_resume: bool,
        options: HeadlessOptions,
    ) -> Result<MissionOutcome> {
        let span = info_span!(
            "supervisor",
            mission_id = %self.mission.id,
            mode = "headless",
            job = options.job_name.as_deref().unwrap_or(""),
            job_id = options.job_id.as_deref().unwrap_or(""),
        );
        async move {
            let prompt = self
                .mission
                .prompt
                .clone()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| AppError::Config("headless mission has no prompt".into()))?;

            let _pid_file = self.claim().await?;
            let result = self.headless_run(prompt, is_resume, options.timeout).await;
            self.finalize(&result).await;
            result
        }
        .instrument(span)
        .await
    }

    /// Write the PID file and record the supervisor PID in the store.
    async fn claim(&self) -> Result<PidFile> {
        let pid = std::process::id();
        let guard = PidFile::create(&self.paths.pid_file, pid)?;
        if let Err(err) = self.repo.set_pid(&self.mission.id, pid).await {
            warn!(%err, "failed to record supervisor pid");
        }
        self.record(JournalEntry::new(&self.mission.id, JournalEventType::SupervisorStart).with_pid(Some(pid)));
        info!(pid, "supervisor started");
        Ok(guard)
    }

    #[allow(clippy::too_many_lines)] // One select arm per event source.
    async fn interactive_loop(&self, is_resume: bool) -> Result<MissionOutcome> {
        let mut signals = OsSignals::install()?;

        // Every background task stops when this scope ends, on any path.
        let watchers = self.cancel.child_token();
        let _stop_watchers = watchers.clone().drop_guard();

        let (inbox, mut command_rx) = CommandInbox::new();
        let (status_tx, status_rx) = watch::channel(SupervisorStatus::default());
        let (idle_tx, mut idle_rx) = mpsc::channel(1);

        let idle_watcher = IdleWatcher::spawn(
            &self.paths.state_file,
            self.config.idle_debounce(),
            idle_tx,
            watchers.clone(),
        )?;
        let _heartbeat = spawn_heartbeat(
            self.repo.clone(),
            self.mission.id.clone(),
            self.config.heartbeat_interval(),
            watchers.clone(),
        );
        let _server = spawn_command_server(
            &self.mission.id,
            ControlHandle {
                inbox: Arc::clone(&inbox),
                status: status_rx,
            },
            watchers.clone(),
        )?;

        let mut machine = RestartMachine::new(is_resume);
        let mut restarts = 0_u32;

        self.pull_credentials();
        let (mut child, mut agent_pid) = self.spawn_agent(&LaunchMode::interactive(is_resume))?;
        publish(&status_tx, &machine, agent_pid, restarts);

        loop {
            tokio::select! {
                received = signals.recv() => {
                    info!(signal = received.name(), "forwarding signal to agent");
                    self.record(
                        JournalEntry::new(&self.mission.id, JournalEventType::SignalForwarded)
                            .with_pid(agent_pid)
                            .with_reason(received.name()),
                    );
                    let exit_code = self.shutdown_child(&mut child, agent_pid, received).await;
                    return Ok(MissionOutcome {
                        exit_code,
                        restarts,
                        reason: ExitReason::Signal(received.name()),
                    });
                }
                () = self.cancel.cancelled() => {
                    info!("supervisor cancelled");
                    let exit_code = self
                        .shutdown_child(&mut child, agent_pid, ProcessSignal::Terminate)
                        .await;
                    return Ok(MissionOutcome {
                        exit_code,
                        restarts,
                        reason: ExitReason::Cancelled,
                    });
                }
                Some(()) = command_rx.recv() => {
                    if let Some(command) = inbox.take() {
                        info!(mode = command.mode.as_str(), reason = %command.reason, "restart requested");
                        self.record(
                            JournalEntry::new(&self.mission.id, JournalEventType::RestartRequested)
                                .with_mode(command.mode.as_str())
                                .with_reason(command.reason.clone()),
                        );
                        let mode = command.mode;
                        let action = machine.request(command);
                        if action == ChildAction::None && machine.state() == WrapperState::RestartPending {
                            debug!("agent busy, restart deferred");
                            self.record(
                                JournalEntry::new(&self.mission.id, JournalEventType::RestartDeferred)
                                    .with_mode(mode.as_str()),
                            );
                        }
                        self.apply(action, agent_pid);
                    }
                }
                Some(()) = idle_rx.recv() => {
                    // A turn shorter than the debounce window still counts.
                    if idle_watcher.take_busy_seen() {
                        let action = machine.observe(Activity::Busy);
                        self.apply(action, agent_pid);
                    }
                    if let Some(activity) = read_activity(&self.paths.state_file) {
                        debug!(activity = activity.as_str(), "agent activity");
                        let action = machine.observe(activity);
                        self.apply(action, agent_pid);
                    }
                }
                status = child.wait() => {
                    let exit_code = match status {
                        Ok(status) => status.code(),
                        Err(err) => {
                            warn!(%err, "failed to wait on agent");
                            None
                        }
                    };
                    info!(?exit_code, state = %machine.state(), "agent exited");
                    self.record(
                        JournalEntry::new(&self.mission.id, JournalEventType::AgentExited)
                            .with_pid(agent_pid)
                            .with_exit_code(exit_code),
                    );

                    match machine.child_exited() {
                        ExitDecision::Respawn { resume } => {
                            if let Err(err) = write_activity(&self.paths.state_file, Activity::Idle) {
                                warn!(%err, "failed to reset idle marker");
                            }
                            self.pull_credentials();
                            (child, agent_pid) = self
                                .spawn_agent(&LaunchMode::interactive(resume))
                                .inspect_err(|err| error!(%err, "failed to respawn agent"))?;
                            restarts += 1;
                        }
                        ExitDecision::Finish => {
                            return Ok(MissionOutcome {
                                exit_code,
                                restarts,
                                reason: ExitReason::ChildExited,
                            });
                        }
                    }
                }
            }
            publish(&status_tx, &machine, agent_pid, restarts);
        }
    }

    #[allow(clippy::too_many_lines)] // Completion, signal, cancel and deadline arms.
    async fn headless_run(
        &self,
        prompt: String,
        is_resume: bool,
        budget: Option<Duration>,
    ) -> Result<MissionOutcome> {
        let mut signals = OsSignals::install()?;

        let watchers = self.cancel.child_token();
        let _stop_watchers = watchers.clone().drop_guard();
        let _heartbeat = spawn_heartbeat(
            self.repo.clone(),
            self.mission.id.clone(),
            self.config.heartbeat_interval(),
            watchers,
        );

        let log = Arc::new(Mutex::new(RotatingLog::open(
            &self.paths.output_log,
            self.config.log_max_bytes,
            self.config.log_backups,
        )?));

        self.pull_credentials();
        let (mut child, agent_pid) = self.spawn_agent(&LaunchMode::Headless {
            prompt,
            resume: is_resume,
        })?;
        let pumps: Vec<_> = [
            child.stdout.take().map(|out| spawn_pump(out, Arc::clone(&log))),
            child.stderr.take().map(|err| spawn_pump(err, Arc::clone(&log))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let deadline = async {
            match budget {
                Some(budget) => tokio::time::sleep(budget).await,
                None => std::future::pending().await,
            }
        };

        let result = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => {
                    let exit_code = status.code();
                    info!(?exit_code, "headless agent finished");
                    self.record(
                        JournalEntry::new(&self.mission.id, JournalEventType::AgentExited)
                            .with_pid(agent_pid)
                            .with_exit_code(exit_code),
                    );
                    Ok(MissionOutcome { exit_code, restarts: 0, reason: ExitReason::ChildExited })
                }
                Err(err) => Err(AppError::Process(format!("failed to wait on agent: {err}"))),
            },
            received = signals.recv() => {
                info!(signal = received.name(), "stopping headless agent");
                let exit_code = self
                    .shutdown_child(&mut child, agent_pid, ProcessSignal::Terminate)
                    .await;
                Ok(MissionOutcome { exit_code, restarts: 0, reason: ExitReason::Signal(received.name()) })
            }
            () = self.cancel.cancelled() => {
                info!("headless mission cancelled");
                let exit_code = self
                    .shutdown_child(&mut child, agent_pid, ProcessSignal::Terminate)
                    .await;
                Ok(MissionOutcome { exit_code, restarts: 0, reason: ExitReason::Cancelled })
            }
            () = deadline => {
                let budget = budget.unwrap_or_default();
                warn!(budget_secs = budget.as_secs(), "headless mission timed out");
                self.record(
                    JournalEntry::new(&self.mission.id, JournalEventType::Timeout)
                        .with_pid(agent_pid)
                        .with_reason(format!("exceeded {}s", budget.as_secs())),
                );
                self.shutdown_child(&mut child, agent_pid, ProcessSignal::Terminate).await;
                Err(AppError::Timeout(format!(
                    "mission {} exceeded its {}s budget",
                    self.mission.id,
                    budget.as_secs()
                )))
            }
        };

        // Grandchildren may still hold the pipes open; do not wait forever.
        for pump in pumps {
            if tokio::time::timeout(self.config.shutdown_grace(), pump).await.is_err() {
                warn!("agent output still open after exit, abandoning capture");
            }
        }
        result
    }

    /// Send `first` to the agent, wait up to the grace window, then kill it.
    async fn shutdown_child(
        &self,
        child: &mut Child,
        pid: Option<u32>,
        first: ProcessSignal,
    ) -> Option<i32> {
        if let Some(pid) = pid {
            if let Err(err) = send_signal(pid, first) {
                debug!(%err, "polite signal not delivered");
            }
        }

        match tokio::time::timeout(self.config.shutdown_grace(), child.wait()).await {
            Ok(Ok(status)) => status.code(),
            Ok(Err(err)) => {
                warn!(%err, "failed to wait on agent");
                None
            }
            Err(_) => {
                warn!(?pid, "agent ignored {}, killing", first.name());
                self.record(JournalEntry::new(&self.mission.id, JournalEventType::ForcedKill).with_pid(pid));
                if let Err(err) = child.kill().await {
                    warn!(%err, "failed to kill agent");
                }
                None
            }
        }
    }

    fn spawn_agent(&self, mode: &LaunchMode) -> Result<(Child, Option<u32>)> {
        let mut cmd = self.launcher.command(&self.mission, mode);
        cmd.kill_on_drop(true);
        if matches!(mode, LaunchMode::Headless { .. }) {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        let child = cmd
            .spawn()
            .map_err(|err| AppError::Spawn(format!("failed to start agent: {err}")))?;
        let pid = child.id();
        info!(?pid, launch = mode.label(), "agent spawned");
        self.record(
            JournalEntry::new(&self.mission.id, JournalEventType::AgentSpawned)
                .with_pid(pid)
                .with_mode(mode.label()),
        );
        Ok((child, pid))
    }

    /// Carry out a state machine action on the live agent.
    fn apply(&self, action: ChildAction, pid: Option<u32>) {
        let sig = match action {
            ChildAction::None => return,
            ChildAction::Interrupt => ProcessSignal::Interrupt,
            ChildAction::Kill => ProcessSignal::Kill,
        };

        info!(?pid, signal = sig.name(), "applying restart");
        if let Some(pid) = pid {
            // The agent may already be gone; its exit drives the next step.
            if let Err(err) = send_signal(pid, sig) {
                warn!(%err, "restart signal not delivered");
            }
        }
        self.record(
            JournalEntry::new(&self.mission.id, JournalEventType::RestartApplied)
                .with_pid(pid)
                .with_reason(sig.name()),
        );
    }

    fn pull_credentials(&self) {
        self.sync_credentials("pull", self.credentials.pull());
    }

    fn sync_credentials(&self, direction: &str, result: Result<SyncOutcome>) {
        match result {
            Ok(SyncOutcome::Copied) => {
                info!(direction, "credentials synchronised");
                self.record(
                    JournalEntry::new(&self.mission.id, JournalEventType::CredentialSync)
                        .with_reason(direction),
                );
            }
            Ok(_) => debug!(direction, "credentials unchanged"),
            Err(err) => warn!(direction, %err, "credential sync failed"),
        }
    }

    /// Exit-path bookkeeping. Every step is best-effort.
    async fn finalize(&self, result: &Result<MissionOutcome>) {
        self.sync_credentials("push", self.credentials.push());

        let (exit_code, reason) = match result {
            Ok(outcome) => (outcome.exit_code, outcome.reason.to_string()),
            Err(err) => (None, err.to_string()),
        };
        if let Err(err) = self.repo.mark_finished(&self.mission.id, exit_code).await {
            warn!(%err, "failed to mark mission finished");
        }
        self.record(
            JournalEntry::new(&self.mission.id, JournalEventType::SupervisorExit)
                .with_exit_code(exit_code)
                .with_reason(reason.as_str()),
        );
        info!(?exit_code, %reason, "supervisor exiting");
    }

    fn record(&self, entry: JournalEntry) {
        if let Err(err) = self.journal.log_entry(entry) {
            warn!(%err, "journal write failed");
        }
    }
}

fn publish(
    tx: &watch::Sender<SupervisorStatus>,
    machine: &RestartMachine,
    agent_pid: Option<u32>,
    restarts: u32,
) {
    tx.send_replace(SupervisorStatus {
        state: machine.state(),
        conversation: machine.conversation_exists(),
        agent_pid,
        restarts,
    });
}

/// Termination signals the supervisor reacts to.
struct OsSignals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
}

impl OsSignals {
    fn install() -> Result<Self> {
        let install = |kind: SignalKind| {
            signal(kind).map_err(|err| AppError::Process(format!("failed to install signal handler: {err}")))
        };
        Ok(Self {
            interrupt: install(SignalKind::interrupt())?,
            terminate: install(SignalKind::terminate())?,
            hangup: install(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> ProcessSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ProcessSignal::Interrupt,
            _ = self.terminate.recv() => ProcessSignal::Terminate,
            _ = self.hangup.recv() => ProcessSignal::Hangup,
        }
    }
}

/// Whether `mission_dir` currently holds a live supervisor, per its PID file.
///
/// # Errors
///
/// Returns `AppError::Io` if the PID file exists but cannot be read.
pub fn supervisor_pid(mission_dir: &Path) -> Result<Option<u32>> {
    let pid = crate::process::read_pid(&MissionPaths::new(mission_dir).pid_file)?;
    Ok(pid.filter(|pid| crate::process::is_alive(*pid)))
}
