#![forbid(unsafe_code)]

//! `agent-missions`: mission supervisor and cron scheduler binary.
//!
//! `run` and `new` supervise an interactive agent in the foreground,
//! `headless` runs a scheduled mission (normally started by `cron`), `cron`
//! is the scheduler daemon and `list` prints the mission store.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use agent_missions::config::{minutes, CronJobConfig};
use agent_missions::cron::{CronScheduler, ExeLauncher, FileJobSource};
use agent_missions::models::{Mission, MissionFilter};
use agent_missions::persistence::db;
use agent_missions::persistence::mission_repo::MissionRepo;
use agent_missions::process::SignalProbe;
use agent_missions::supervisor::{self, HeadlessOptions, MissionOutcome, MissionSupervisor};
use agent_missions::{AppError, GlobalConfig, Result};

/// Exit status reported when a headless mission runs out of time.
const TIMEOUT_EXIT: u8 = 124;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-missions", about = "Coding-agent mission supervisor", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Supervise an existing mission interactively, resuming its conversation.
    Run {
        /// Mission ID.
        mission_id: String,
        /// Start a fresh conversation instead of resuming.
        #[arg(long)]
        fresh: bool,
    },

    /// Run a mission's prompt non-interactively.
    Headless {
        /// Mission ID.
        mission_id: String,
        /// Resume the previous conversation.
        #[arg(long)]
        resume: bool,
        /// Time budget in minutes; defaults to the cron job's setting.
        #[arg(long)]
        timeout_minutes: Option<u64>,
    },

    /// Create a mission and supervise it interactively.
    New {
        /// Directory the agent works in.
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Repository the mission belongs to.
        #[arg(long)]
        repo: Option<String>,
        /// Template the mission was created from.
        #[arg(long)]
        template: Option<String>,
    },

    /// Run the cron scheduler until interrupted.
    Cron,

    /// List missions, newest first.
    List {
        /// Only scheduled missions.
        #[arg(long)]
        cron: bool,
        /// Only missions whose supervisor has not finished.
        #[arg(long)]
        live: bool,
        /// Maximum number of rows.
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<ExitCode> {
    let config = GlobalConfig::load_from_path(&args.config)?;
    let db = Arc::new(db::connect(&config.db_path()).await?);
    let repo = MissionRepo::new(db);

    match args.command {
        Command::Run { mission_id, fresh } => {
            let mission = repo.get_by_id(&mission_id).await?;
            supervise(mission, &config, repo, !fresh).await
        }
        Command::New {
            workspace,
            repo: linked_repo,
            template,
        } => {
            let mut mission = Mission::new(&config.missions_root()).with_repo(linked_repo, template);
            if let Some(ref workspace) = workspace {
                mission = mission.with_workspace(&absolute(workspace)?);
            }
            let mission = repo.create(&mission).await?;
            println!("{}", mission.id);
            supervise(mission, &config, repo, false).await
        }
        Command::Headless {
            mission_id,
            resume,
            timeout_minutes,
        } => {
            let mission = repo.get_by_id(&mission_id).await?;
            let job = mission
                .cron_job
                .as_ref()
                .and_then(|name| config.cron.jobs.get(name));
            let options = HeadlessOptions {
                timeout: timeout_minutes
                    .map(minutes)
                    .or_else(|| job.and_then(CronJobConfig::timeout)),
                job_id: mission.cron_run_id.clone(),
                job_name: mission.cron_job.clone(),
            };

            let supervisor =
                MissionSupervisor::new(mission, &config, repo, CancellationToken::new())?;
            match supervisor.run_headless(resume, options).await {
                Ok(outcome) => Ok(exit_code(&outcome)),
                Err(err) if err.is_timeout() => {
                    error!(%err, "headless mission timed out");
                    Ok(ExitCode::from(TIMEOUT_EXIT))
                }
                Err(err) => Err(err),
            }
        }
        Command::Cron => run_scheduler(&args.config, &config, repo).await,
        Command::List { cron, live, limit } => {
            list_missions(&repo, cron, live, limit).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn supervise(
    mission: Mission,
    config: &GlobalConfig,
    repo: MissionRepo,
    is_resume: bool,
) -> Result<ExitCode> {
    if let Some(pid) = supervisor::supervisor_pid(Path::new(&mission.mission_dir))? {
        return Err(AppError::Process(format!(
            "mission {} is already supervised by pid {pid}",
            mission.id
        )));
    }

    let supervisor = MissionSupervisor::new(mission, config, repo, CancellationToken::new())?;
    let outcome = supervisor.run(is_resume).await?;
    info!(restarts = outcome.restarts, reason = %outcome.reason, "mission ended");
    Ok(exit_code(&outcome))
}

async fn run_scheduler(config_path: &Path, config: &GlobalConfig, repo: MissionRepo) -> Result<ExitCode> {
    let config_path = absolute(config_path)?;
    let scheduler = CronScheduler::new(
        Arc::new(FileJobSource::new(config_path.clone(), config.cron.clone())),
        repo,
        Arc::new(SignalProbe),
        Arc::new(ExeLauncher::current(config_path)?),
        config.missions_root(),
    );

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    scheduler.run(ct).await;
    Ok(ExitCode::SUCCESS)
}

async fn list_missions(repo: &MissionRepo, cron: bool, live: bool, limit: u32) -> Result<()> {
    let missions = repo
        .list(&MissionFilter {
            cron_only: cron,
            live_only: live,
            limit: Some(limit),
            ..MissionFilter::default()
        })
        .await?;

    for mission in missions {
        let running = supervisor::supervisor_pid(Path::new(&mission.mission_dir))
            .ok()
            .flatten();
        println!(
            "{}  {:<10}  {:<16}  {}  {}",
            mission.id,
            running.map_or_else(|| "-".to_owned(), |pid| format!("pid {pid}")),
            mission.cron_job.as_deref().unwrap_or("-"),
            mission.created_at.format("%Y-%m-%d %H:%M"),
            mission.workspace_root,
        );
    }
    Ok(())
}

/// Mirror the agent's exit status; death by signal maps to 1.
fn exit_code(outcome: &MissionOutcome) -> ExitCode {
    outcome
        .exit_code
        .and_then(|code| u8::try_from(code).ok())
        .map_or(ExitCode::FAILURE, ExitCode::from)
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .map_err(|err| AppError::Config(format!("invalid path {}: {err}", path.display())))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
            let _ = ctrl_c.await;
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
