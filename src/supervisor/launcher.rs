//! Agent command construction.
//!
//! The supervisor decides *when* to start an agent and wires its stdio; an
//! [`AgentLauncher`] decides *what* gets started. The production
//! [`CliLauncher`] builds the command line from the `[agent]` config.

use tokio::process::Command;

use crate::config::AgentConfig;
use crate::models::mission::Mission;

/// Environment variable carrying the mission identifier.
pub const MISSION_ID_ENV: &str = "AGENT_MISSION_ID";
/// Environment variable carrying the idle/busy side-channel path.
pub const STATE_FILE_ENV: &str = "AGENT_MISSION_STATE_FILE";

/// Which flavour of agent process to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    /// New conversation.
    Fresh,
    /// Continue the previous conversation.
    Resume,
    /// Single non-interactive instruction.
    Headless {
        /// Instruction text.
        prompt: String,
        /// Continue the previous conversation.
        resume: bool,
    },
}

impl LaunchMode {
    /// Interactive launch for the given conversation latch.
    #[must_use]
    pub fn interactive(resume: bool) -> Self {
        if resume {
            Self::Resume
        } else {
            Self::Fresh
        }
    }

    /// Short name for logs; never includes the prompt.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Resume => "resume",
            Self::Headless { .. } => "headless",
        }
    }
}

/// Builds the agent command for a mission. Stdio is configured by the caller.
pub trait AgentLauncher: Send + Sync {
    /// Command for `mode`, with working directory and environment set.
    fn command(&self, mission: &Mission, mode: &LaunchMode) -> Command;
}

/// [`AgentLauncher`] driven by the `[agent]` config section.
#[derive(Debug, Clone)]
pub struct CliLauncher {
    agent: AgentConfig,
}

impl CliLauncher {
    /// Create a launcher for the configured agent CLI.
    #[must_use]
    pub fn new(agent: AgentConfig) -> Self {
        Self { agent }
    }

    /// Full argument vector for `mode`.
    #[must_use]
    pub fn args(&self, mode: &LaunchMode) -> Vec<String> {
        let mut args = self.agent.args.clone();
        match mode {
            LaunchMode::Fresh => {}
            LaunchMode::Resume => args.extend(self.agent.resume_args.iter().cloned()),
            LaunchMode::Headless { prompt, resume } => {
                if *resume {
                    args.extend(self.agent.resume_args.iter().cloned());
                }
                args.extend(self.agent.headless_args.iter().cloned());
                args.push(prompt.clone());
            }
        }
        args
    }
}

impl AgentLauncher for CliLauncher {
    fn command(&self, mission: &Mission, mode: &LaunchMode) -> Command {
        let paths = mission.paths();
        let mut cmd = Command::new(&self.agent.cli);
        cmd.args(self.args(mode))
            .current_dir(&mission.workspace_root)
            .env(MISSION_ID_ENV, &mission.id)
            .env(STATE_FILE_ENV, &paths.state_file);
        if let Some(ref var) = self.agent.config_dir_env {
            cmd.env(var, &paths.config_dir);
        }
        cmd
    }
}
