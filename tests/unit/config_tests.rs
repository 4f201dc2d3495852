use std::path::Path;
use std::time::Duration;

use agent_missions::config::{minutes, GlobalConfig, OverlapPolicy};
use agent_missions::AppError;

fn sample_toml(data_dir: &str) -> String {
    format!(
        r#"
data_dir = '{data_dir}'

[agent]
cli = "claude"
args = ["--verbose"]
resume_args = ["--resume-last"]
headless_args = ["-p"]
config_dir_env = "CLAUDE_CONFIG_DIR"
shared_config_dir = "/home/dev/.claude"

[supervisor]
heartbeat_seconds = 15
idle_debounce_ms = 100
shutdown_grace_seconds = 5
log_max_bytes = 4096
log_backups = 2

[cron]
max_concurrent = 2
tick_seconds = 30
shutdown_grace_seconds = 20

[cron.jobs.nightly-review]
schedule = "0 2 * * *"
prompt = "review yesterday's merges"
overlap = "allow"
timeout_minutes = 45

[cron.jobs.triage]
schedule = "*/15 9-17 * * mon-fri"
prompt = "triage new issues"
enabled = false
"#
    )
}

fn minimal_toml(data_dir: &str) -> String {
    format!(
        r#"
data_dir = '{data_dir}'

[agent]
cli = "claude"
"#
    )
}

#[test]
fn parses_full_config() {
    let config = GlobalConfig::from_toml_str(&sample_toml("/var/lib/missions")).expect("valid");

    assert_eq!(config.agent.args, vec!["--verbose"]);
    assert_eq!(config.agent.resume_args, vec!["--resume-last"]);
    assert_eq!(config.agent.config_dir_env.as_deref(), Some("CLAUDE_CONFIG_DIR"));
    assert_eq!(config.supervisor.heartbeat_interval(), Duration::from_secs(15));
    assert_eq!(config.supervisor.idle_debounce(), Duration::from_millis(100));
    assert_eq!(config.cron.max_concurrent, 2);
    assert_eq!(config.cron.tick_interval(), Duration::from_secs(30));
    assert_eq!(config.cron.shutdown_grace(), Duration::from_secs(20));

    let nightly = &config.cron.jobs["nightly-review"];
    assert_eq!(nightly.overlap, OverlapPolicy::Allow);
    assert!(nightly.enabled);
    assert_eq!(nightly.timeout(), Some(Duration::from_secs(45 * 60)));

    let triage = &config.cron.jobs["triage"];
    assert!(!triage.enabled);
    assert_eq!(triage.overlap, OverlapPolicy::Skip);
    assert_eq!(triage.timeout(), None);
}

#[test]
fn minimal_config_uses_defaults() {
    let config = GlobalConfig::from_toml_str(&minimal_toml("/tmp/m")).expect("valid");

    assert_eq!(config.agent.resume_args, vec!["--continue"]);
    assert_eq!(config.agent.headless_args, vec!["--print"]);
    assert_eq!(config.agent.credentials_file, ".credentials.json");
    assert_eq!(config.supervisor.heartbeat_seconds, 30);
    assert_eq!(config.supervisor.shutdown_grace(), Duration::from_secs(10));
    assert_eq!(config.supervisor.log_max_bytes, 10 * 1024 * 1024);
    assert_eq!(config.supervisor.log_backups, 3);
    assert_eq!(config.cron.max_concurrent, 3);
    assert_eq!(config.cron.tick_seconds, 60);
    assert!(config.cron.jobs.is_empty());
}

#[test]
fn derived_paths_live_under_data_dir() {
    let config = GlobalConfig::from_toml_str(&minimal_toml("/srv/agents")).expect("valid");

    assert_eq!(config.db_path(), Path::new("/srv/agents/missions.db"));
    assert_eq!(config.mission_dir("abc"), Path::new("/srv/agents/missions/abc"));
}

#[test]
fn zero_timeout_means_unbounded() {
    let raw = format!(
        "{}\n[cron.jobs.j]\nschedule = \"@hourly\"\nprompt = \"p\"\ntimeout_minutes = 0\n",
        minimal_toml("/tmp/m")
    );
    let config = GlobalConfig::from_toml_str(&raw).expect("valid");
    assert_eq!(config.cron.jobs["j"].timeout(), None);
}

#[test]
fn bad_schedule_is_not_a_load_error() {
    let raw = format!(
        "{}\n[cron.jobs.broken]\nschedule = \"every tuesday\"\nprompt = \"p\"\n",
        minimal_toml("/tmp/m")
    );
    let config = GlobalConfig::from_toml_str(&raw).expect("schedules are checked per cycle");
    assert_eq!(config.cron.jobs["broken"].schedule, "every tuesday");
}

#[test]
fn zero_max_concurrent_is_rejected() {
    let raw = sample_toml("/tmp/m").replace("max_concurrent = 2", "max_concurrent = 0");
    let err = GlobalConfig::from_toml_str(&raw).expect_err("must reject");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("max_concurrent")));
}

#[test]
fn zero_heartbeat_is_rejected() {
    let raw = sample_toml("/tmp/m").replace("heartbeat_seconds = 15", "heartbeat_seconds = 0");
    let err = GlobalConfig::from_toml_str(&raw).expect_err("must reject");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("heartbeat_seconds")));
}

#[test]
fn blank_agent_cli_is_rejected() {
    let raw = minimal_toml("/tmp/m").replace("cli = \"claude\"", "cli = \"  \"");
    let err = GlobalConfig::from_toml_str(&raw).expect_err("must reject");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("agent.cli")));
}

#[test]
fn bad_job_table_is_isolated_from_the_rest() {
    let raw = format!(
        r#"{}
[cron.jobs.good]
schedule = "@hourly"
prompt = "tidy the backlog"

[cron.jobs.no-prompt]
schedule = "@hourly"

[cron.jobs.queued]
schedule = "@daily"
prompt = "p"
overlap = "queue"
"#,
        minimal_toml("/tmp/m")
    );
    let config = GlobalConfig::from_toml_str(&raw).expect("one bad job must not sink the file");

    assert_eq!(config.cron.jobs.keys().collect::<Vec<_>>(), vec!["good"]);
    assert_eq!(
        config.cron.invalid_jobs.keys().collect::<Vec<_>>(),
        vec!["no-prompt", "queued"]
    );
    assert!(config.cron.invalid_jobs["no-prompt"].contains("prompt"));
    assert!(config.cron.invalid_jobs["queued"].contains("queue"));
}

#[test]
fn huge_timeout_saturates() {
    let raw = format!(
        "{}\n[cron.jobs.j]\nschedule = \"@hourly\"\nprompt = \"p\"\ntimeout_minutes = {}\n",
        minimal_toml("/tmp/m"),
        i64::MAX
    );
    let config = GlobalConfig::from_toml_str(&raw).expect("valid");
    assert_eq!(config.cron.jobs["j"].timeout(), Some(Duration::from_secs(u64::MAX)));
    assert_eq!(minutes(u64::MAX), Duration::from_secs(u64::MAX));
    assert_eq!(minutes(2), Duration::from_secs(120));
}

#[test]
fn missing_agent_section_is_rejected() {
    let err = GlobalConfig::from_toml_str("data_dir = '/tmp/m'\n").expect_err("must reject");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn load_from_missing_file_is_config_error() {
    let err = GlobalConfig::load_from_path("/definitely/not/here.toml").expect_err("missing");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("failed to read config")));
}
