//! Mission model and on-disk layout helpers.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One supervised run of the agent, interactive or scheduled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Mission {
    /// Unique record identifier.
    pub id: String,
    /// Directory the agent process runs in.
    pub workspace_root: String,
    /// Directory holding the PID file, logs and credential scope.
    pub mission_dir: String,
    /// Linked repository, if the mission was started from one.
    pub repo: Option<String>,
    /// Template the mission was created from.
    pub template: Option<String>,
    /// Stable cron job name for scheduled missions.
    pub cron_job: Option<String>,
    /// Per-run identifier assigned by the scheduler.
    pub cron_run_id: Option<String>,
    /// Instruction for headless runs.
    pub prompt: Option<String>,
    /// PID of the supervisor process, once known.
    pub pid: Option<u32>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last heartbeat written by the supervisor.
    pub heartbeat_at: Option<DateTime<Utc>>,
    /// Set when the supervisor exits.
    pub ended_at: Option<DateTime<Utc>>,
    /// Exit code of the final agent process, when it had one.
    pub exit_code: Option<i32>,
}

impl Mission {
    /// Construct a new mission rooted under `missions_root/<id>`.
    ///
    /// The agent works in `<mission_dir>/workspace` unless a workspace is
    /// supplied with [`Mission::with_workspace`].
    #[must_use]
    pub fn new(missions_root: &Path) -> Self {
        let id = Uuid::new_v4().to_string();
        let mission_dir = missions_root.join(&id);
        Self {
            workspace_root: mission_dir.join("workspace").to_string_lossy().into_owned(),
            mission_dir: mission_dir.to_string_lossy().into_owned(),
            id,
            repo: None,
            template: None,
            cron_job: None,
            cron_run_id: None,
            prompt: None,
            pid: None,
            created_at: Utc::now(),
            heartbeat_at: None,
            ended_at: None,
            exit_code: None,
        }
    }

    /// Run the agent in an explicit workspace directory.
    #[must_use]
    pub fn with_workspace(mut self, workspace_root: &Path) -> Self {
        self.workspace_root = workspace_root.to_string_lossy().into_owned();
        self
    }

    /// Link a repository and optional template.
    #[must_use]
    pub fn with_repo(mut self, repo: Option<String>, template: Option<String>) -> Self {
        self.repo = repo;
        self.template = template;
        self
    }

    /// Tag the mission as a scheduled run of `job`.
    #[must_use]
    pub fn for_cron_job(mut self, job: &str, run_id: String, prompt: &str) -> Self {
        self.cron_job = Some(job.to_owned());
        self.cron_run_id = Some(run_id);
        self.prompt = Some(prompt.to_owned());
        self
    }

    /// Whether the scheduler started this mission.
    #[must_use]
    pub fn is_cron(&self) -> bool {
        self.cron_job.is_some()
    }

    /// File layout inside the mission directory.
    #[must_use]
    pub fn paths(&self) -> MissionPaths {
        MissionPaths::new(Path::new(&self.mission_dir))
    }
}

/// Well-known files inside a mission directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissionPaths {
    /// Mission directory.
    pub root: PathBuf,
    /// Plain-text PID of the supervisor; present only while it runs.
    pub pid_file: PathBuf,
    /// Idle/busy side-channel written by the agent.
    pub state_file: PathBuf,
    /// Structured supervisor diagnostic log.
    pub journal: PathBuf,
    /// Captured headless output.
    pub output_log: PathBuf,
    /// Per-mission agent config scope (credentials live here).
    pub config_dir: PathBuf,
}

impl MissionPaths {
    /// Derive the layout for a mission directory.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_owned(),
            pid_file: root.join("wrapper.pid"),
            state_file: root.join("agent-state"),
            journal: root.join("wrapper.jsonl"),
            output_log: root.join("output.log"),
            config_dir: root.join("config"),
        }
    }
}

/// Filter for [`crate::persistence::mission_repo::MissionRepo::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionFilter {
    /// Only missions of this job.
    pub cron_job: Option<String>,
    /// Only missions started by the scheduler.
    pub cron_only: bool,
    /// Only missions that have a PID and have not ended.
    pub live_only: bool,
    /// Maximum number of rows, newest first.
    pub limit: Option<u32>,
}
