//! Unit tests for the mission repository.
//!
//! Validates:
//! - Create and fetch round trip
//! - List filters (cron only, live only, by job, limit) and ordering
//! - Most recent mission lookup by job name
//! - Heartbeat, PID and finish updates, including missing records

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};

use agent_missions::models::{Mission, MissionFilter};
use agent_missions::persistence::{db, mission_repo::MissionRepo};
use agent_missions::AppError;

async fn repo() -> MissionRepo {
    MissionRepo::new(Arc::new(db::connect_memory().await.expect("db")))
}

fn mission() -> Mission {
    Mission::new(Path::new("/srv/missions"))
}

fn cron_mission(job: &str, minutes_ago: i64) -> Mission {
    let mut mission = mission().for_cron_job(job, format!("run-{minutes_ago}"), "do the thing");
    mission.created_at = Utc::now() - Duration::minutes(minutes_ago);
    mission
}

#[tokio::test]
async fn create_and_fetch() {
    let repo = repo().await;
    let created = repo
        .create(&mission().with_repo(Some("git@example.com:app.git".into()), Some("rust".into())))
        .await
        .expect("create");

    let fetched = repo.get_by_id(&created.id).await.expect("fetch");
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.repo.as_deref(), Some("git@example.com:app.git"));
    assert_eq!(fetched.template.as_deref(), Some("rust"));
    assert_eq!(fetched.workspace_root, created.workspace_root);
    assert!(!fetched.is_cron());
    assert!(fetched.pid.is_none());
    assert!(fetched.ended_at.is_none());
    assert_eq!(
        fetched.created_at.timestamp_micros(),
        created.created_at.timestamp_micros()
    );
}

#[tokio::test]
async fn missing_mission_is_not_found() {
    let repo = repo().await;
    assert!(matches!(
        repo.get_by_id("nope").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        repo.update_heartbeat("nope").await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        repo.set_pid("nope", 7).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn list_filters_and_orders_newest_first() {
    let repo = repo().await;
    let interactive = repo.create(&mission()).await.expect("create");
    let old = repo.create(&cron_mission("nightly", 30)).await.expect("create");
    let new = repo.create(&cron_mission("nightly", 5)).await.expect("create");
    let other = repo.create(&cron_mission("triage", 10)).await.expect("create");

    repo.set_pid(&new.id, 100).await.expect("pid");
    repo.set_pid(&other.id, 200).await.expect("pid");
    repo.set_pid(&interactive.id, 300).await.expect("pid");
    repo.mark_finished(&other.id, Some(0)).await.expect("finish");

    let all = repo.list(&MissionFilter::default()).await.expect("list");
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].id, interactive.id, "created last, so newest");

    let cron: Vec<String> = repo
        .list(&MissionFilter {
            cron_only: true,
            ..MissionFilter::default()
        })
        .await
        .expect("list")
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(cron, vec![new.id.clone(), other.id.clone(), old.id.clone()]);

    let live_cron = repo
        .list(&MissionFilter {
            cron_only: true,
            live_only: true,
            ..MissionFilter::default()
        })
        .await
        .expect("list");
    assert_eq!(live_cron.len(), 1);
    assert_eq!(live_cron[0].id, new.id);
    assert_eq!(live_cron[0].pid, Some(100));

    let nightly = repo
        .list(&MissionFilter {
            cron_job: Some("nightly".into()),
            limit: Some(1),
            ..MissionFilter::default()
        })
        .await
        .expect("list");
    assert_eq!(nightly.len(), 1);
    assert_eq!(nightly[0].id, new.id);
}

#[tokio::test]
async fn most_recent_for_job_uses_job_name() {
    let repo = repo().await;
    assert!(repo
        .most_recent_for_job("nightly")
        .await
        .expect("query")
        .is_none());

    repo.create(&cron_mission("nightly", 60)).await.expect("create");
    let latest = repo.create(&cron_mission("nightly", 1)).await.expect("create");
    repo.create(&cron_mission("triage", 0)).await.expect("create");

    let found = repo
        .most_recent_for_job("nightly")
        .await
        .expect("query")
        .expect("present");
    assert_eq!(found.id, latest.id);
    assert_eq!(found.cron_job.as_deref(), Some("nightly"));
    assert_eq!(found.prompt.as_deref(), Some("do the thing"));
}

#[tokio::test]
async fn heartbeat_and_finish_are_recorded() {
    let repo = repo().await;
    let created = repo.create(&mission()).await.expect("create");

    repo.update_heartbeat(&created.id).await.expect("heartbeat");
    repo.mark_finished(&created.id, Some(3)).await.expect("finish");

    let fetched = repo.get_by_id(&created.id).await.expect("fetch");
    assert!(fetched.heartbeat_at.is_some());
    assert!(fetched.ended_at.is_some());
    assert_eq!(fetched.exit_code, Some(3));
}

#[tokio::test]
async fn set_pid_reopens_a_finished_mission() {
    let repo = repo().await;
    let created = repo.create(&mission()).await.expect("create");
    repo.mark_finished(&created.id, None).await.expect("finish");

    repo.set_pid(&created.id, 4242).await.expect("pid");

    let fetched = repo.get_by_id(&created.id).await.expect("fetch");
    assert_eq!(fetched.pid, Some(4242));
    assert!(fetched.ended_at.is_none());

    let live = repo
        .list(&MissionFilter {
            live_only: true,
            ..MissionFilter::default()
        })
        .await
        .expect("list");
    assert_eq!(live.len(), 1);
}
