//! Integration tests for headless (scheduled) mission runs.
//!
//! Validates:
//! - The prompt reaches the agent and its output lands in `output.log`
//! - The time budget escalates to a forced kill and reports a timeout
//! - An OS signal stops the agent politely and is reported as the reason
//! - Missions without a prompt are refused before anything starts

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{raise, Signal};
use serial_test::serial;
use tokio_util::sync::CancellationToken;

use agent_missions::journal::JournalEventType;
use agent_missions::models::Mission;
use agent_missions::supervisor::{ExitReason, HeadlessOptions, MissionSupervisor};
use agent_missions::AppError;

use super::test_helpers::{memory_repo, shell_agent_config, wait_until, MemoryJournal};

const TERM_AWARE_AGENT: &str = r#"root="$(dirname "$AGENT_MISSION_STATE_FILE")"
trap 'echo term >> "$root/signals"; exit 0' TERM
touch "$root/started"
while :; do sleep 0.05; done"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn prompt_output_is_captured() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = shell_agent_config(dir.path(), r#"echo "prompt: $1"; echo "warning" >&2"#);
    let repo = memory_repo().await;
    let mission = repo
        .create(&Mission::new(&config.missions_root()).for_cron_job(
            "digest",
            "run-1".into(),
            "summarise the repo",
        ))
        .await
        .expect("create");
    let paths = mission.paths();

    let supervisor = MissionSupervisor::new(mission.clone(), &config, repo.clone(), CancellationToken::new())
        .expect("supervisor");
    let outcome = supervisor
        .run_headless(
            false,
            HeadlessOptions {
                timeout: Some(Duration::from_secs(30)),
                job_id: mission.cron_run_id.clone(),
                job_name: mission.cron_job.clone(),
            },
        )
        .await
        .expect("outcome");

    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.reason, ExitReason::ChildExited);

    let output = fs::read_to_string(&paths.output_log).expect("output log");
    assert!(output.contains("prompt: summarise the repo\n"), "{output}");
    assert!(output.contains("warning\n"), "{output}");
    assert!(!paths.pid_file.exists());

    let journal = fs::read_to_string(&paths.journal).expect("journal");
    assert!(journal.contains(r#""event_type":"agent_spawned""#));
    assert!(journal.contains(r#""event_type":"supervisor_exit""#));

    let stored = repo.get_by_id(&mission.id).await.expect("stored");
    assert_eq!(stored.exit_code, Some(0));
    assert!(stored.ended_at.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn exceeded_budget_is_killed_and_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = shell_agent_config(dir.path(), "trap '' TERM\nwhile :; do sleep 0.05; done");
    let repo = memory_repo().await;
    let mut mission = Mission::new(&config.missions_root());
    mission.prompt = Some("never finishes".into());
    let mission = repo.create(&mission).await.expect("create");
    let paths = mission.paths();
    let journal = Arc::new(MemoryJournal::default());

    let supervisor = MissionSupervisor::new(mission.clone(), &config, repo.clone(), CancellationToken::new())
        .expect("supervisor")
        .with_journal(journal.clone());

    let started = Instant::now();
    let result = supervisor
        .run_headless(
            false,
            HeadlessOptions {
                timeout: Some(Duration::from_millis(200)),
                ..HeadlessOptions::default()
            },
        )
        .await;

    let err = result.expect_err("must time out");
    assert!(err.is_timeout(), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10));

    let events = journal.events();
    assert!(events.contains(&JournalEventType::Timeout));
    assert!(events.contains(&JournalEventType::ForcedKill), "{events:?}");
    assert_eq!(events.last(), Some(&JournalEventType::SupervisorExit));
    assert!(!paths.pid_file.exists());

    let stored = repo.get_by_id(&mission.id).await.expect("stored");
    assert!(stored.ended_at.is_some());
    assert_eq!(stored.exit_code, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn hangup_stops_headless_agent_politely() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = shell_agent_config(dir.path(), TERM_AWARE_AGENT);
    let repo = memory_repo().await;
    let mut mission = Mission::new(&config.missions_root());
    mission.prompt = Some("wait for a signal".into());
    let mission = repo.create(&mission).await.expect("create");
    let paths = mission.paths();

    let supervisor = MissionSupervisor::new(mission, &config, repo, CancellationToken::new())
        .expect("supervisor");
    let handle =
        tokio::spawn(async move { supervisor.run_headless(false, HeadlessOptions::default()).await });

    let started = paths.root.join("started");
    assert!(
        wait_until(Duration::from_secs(10), || started.exists()).await,
        "agent never started"
    );
    raise(Signal::SIGHUP).expect("raise SIGHUP");

    let outcome = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("supervisor stops")
        .expect("join")
        .expect("outcome");

    assert_eq!(outcome.reason, ExitReason::Signal("SIGHUP"));
    assert_eq!(outcome.exit_code, Some(0), "agent trapped SIGTERM");
    let seen = fs::read_to_string(paths.root.join("signals")).expect("agent saw a signal");
    assert_eq!(seen.trim(), "term");
    assert!(!paths.pid_file.exists());
}

#[tokio::test]
async fn missing_prompt_is_refused() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = shell_agent_config(dir.path(), "exit 0");
    let repo = memory_repo().await;
    let mission = repo
        .create(&Mission::new(&config.missions_root()))
        .await
        .expect("create");
    let paths = mission.paths();

    let supervisor =
        MissionSupervisor::new(mission, &config, repo, CancellationToken::new()).expect("supervisor");
    let result = supervisor
        .run_headless(false, HeadlessOptions::default())
        .await;

    assert!(matches!(result, Err(AppError::Config(_))));
    assert!(!paths.pid_file.exists());
    assert!(!paths.output_log.exists());
}
