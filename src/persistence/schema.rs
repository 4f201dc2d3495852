//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `IF NOT EXISTS` and are safe to re-run every time a
//! supervisor or the scheduler opens the database.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the mission table and its indexes.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS mission (
    id              TEXT PRIMARY KEY NOT NULL,
    workspace_root  TEXT NOT NULL,
    mission_dir     TEXT NOT NULL,
    repo            TEXT,
    template        TEXT,
    cron_job        TEXT,
    cron_run_id     TEXT,
    prompt          TEXT,
    pid             INTEGER,
    created_at      TEXT NOT NULL,
    heartbeat_at    TEXT,
    ended_at        TEXT,
    exit_code       INTEGER
);

CREATE INDEX IF NOT EXISTS idx_mission_cron_job ON mission(cron_job, created_at);
CREATE INDEX IF NOT EXISTS idx_mission_cron_run ON mission(cron_run_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
