//! Mission repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Sqlite};

use crate::models::mission::{Mission, MissionFilter};
use crate::{AppError, Result};

use super::db::Database;

/// Repository wrapper around `SQLite` for mission records.
#[derive(Clone)]
pub struct MissionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct MissionRow {
    id: String,
    workspace_root: String,
    mission_dir: String,
    repo: Option<String>,
    template: Option<String>,
    cron_job: Option<String>,
    cron_run_id: Option<String>,
    prompt: Option<String>,
    pid: Option<i64>,
    created_at: String,
    heartbeat_at: Option<String>,
    ended_at: Option<String>,
    exit_code: Option<i64>,
}

impl MissionRow {
    /// Convert a database row into the domain model.
    fn into_mission(self) -> Result<Mission> {
        let pid = self
            .pid
            .map(u32::try_from)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid pid: {e}")))?;
        let exit_code = self
            .exit_code
            .map(i32::try_from)
            .transpose()
            .map_err(|e| AppError::Db(format!("invalid exit_code: {e}")))?;

        Ok(Mission {
            id: self.id,
            workspace_root: self.workspace_root,
            mission_dir: self.mission_dir,
            repo: self.repo,
            template: self.template,
            cron_job: self.cron_job,
            cron_run_id: self.cron_run_id,
            prompt: self.prompt,
            pid,
            created_at: parse_ts("created_at", &self.created_at)?,
            heartbeat_at: self
                .heartbeat_at
                .as_deref()
                .map(|s| parse_ts("heartbeat_at", s))
                .transpose()?,
            ended_at: self
                .ended_at
                .as_deref()
                .map(|s| parse_ts("ended_at", s))
                .transpose()?,
            exit_code,
        })
    }
}

fn parse_ts(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid {field}: {e}")))
}

/// Fixed-width timestamps so text ordering matches time ordering.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl MissionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new mission record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the database insert fails.
    pub async fn create(&self, mission: &Mission) -> Result<Mission> {
        sqlx::query(
            "INSERT INTO mission (id, workspace_root, mission_dir, repo, template,
             cron_job, cron_run_id, prompt, pid, created_at, heartbeat_at, ended_at, exit_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )
        .bind(&mission.id)
        .bind(&mission.workspace_root)
        .bind(&mission.mission_dir)
        .bind(&mission.repo)
        .bind(&mission.template)
        .bind(&mission.cron_job)
        .bind(&mission.cron_run_id)
        .bind(&mission.prompt)
        .bind(mission.pid.map(i64::from))
        .bind(format_ts(mission.created_at))
        .bind(mission.heartbeat_at.map(format_ts))
        .bind(mission.ended_at.map(format_ts))
        .bind(mission.exit_code)
        .execute(self.db.as_ref())
        .await?;

        Ok(mission.clone())
    }

    /// Retrieve a mission by identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the mission does not exist.
    pub async fn get_by_id(&self, id: &str) -> Result<Mission> {
        let row: Option<MissionRow> = sqlx::query_as("SELECT * FROM mission WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.ok_or_else(|| AppError::NotFound(format!("mission {id} not found")))?
            .into_mission()
    }

    /// List missions matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self, filter: &MissionFilter) -> Result<Vec<Mission>> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM mission WHERE 1 = 1");

        if let Some(ref job) = filter.cron_job {
            query.push(" AND cron_job = ").push_bind(job.clone());
        }
        if filter.cron_only {
            query.push(" AND cron_job IS NOT NULL");
        }
        if filter.live_only {
            query.push(" AND pid IS NOT NULL AND ended_at IS NULL");
        }
        query.push(" ORDER BY created_at DESC");
        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows: Vec<MissionRow> = query.build_query_as().fetch_all(self.db.as_ref()).await?;
        rows.into_iter().map(MissionRow::into_mission).collect()
    }

    /// Most recently created mission of a cron job, looked up by job name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn most_recent_for_job(&self, job_name: &str) -> Result<Option<Mission>> {
        let row: Option<MissionRow> = sqlx::query_as(
            "SELECT * FROM mission WHERE cron_job = ?1 ORDER BY created_at DESC LIMIT 1",
        )
        .bind(job_name)
        .fetch_optional(self.db.as_ref())
        .await?;

        row.map(MissionRow::into_mission).transpose()
    }

    /// Stamp the heartbeat with the current time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the mission does not exist.
    pub async fn update_heartbeat(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE mission SET heartbeat_at = ?1 WHERE id = ?2")
            .bind(format_ts(Utc::now()))
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("mission {id} not found")));
        }
        Ok(())
    }

    /// Record the PID of the process supervising the mission.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the mission does not exist.
    pub async fn set_pid(&self, id: &str, pid: u32) -> Result<()> {
        let result = sqlx::query("UPDATE mission SET pid = ?1, ended_at = NULL WHERE id = ?2")
            .bind(i64::from(pid))
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("mission {id} not found")));
        }
        Ok(())
    }

    /// Mark the mission's supervisor as exited.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn mark_finished(&self, id: &str, exit_code: Option<i32>) -> Result<()> {
        sqlx::query("UPDATE mission SET ended_at = ?1, exit_code = ?2 WHERE id = ?3")
            .bind(format_ts(Utc::now()))
            .bind(exit_code)
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(())
    }
}
