//! Cron scheduler control loop.
//!
//! Once per tick the scheduler prunes dead entries from its running table,
//! reports job tables that failed to decode, evaluates every enabled job
//! against the current minute and launches a headless mission process for
//! each due job that passes the concurrency, double-fire and overlap checks.
//! The running table is a cache of PID liveness: after a scheduler restart it
//! is rebuilt from the mission store by [`CronScheduler::adopt_orphans`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::launcher::MissionLauncher;
use super::schedule::CronSchedule;
use super::source::JobSource;
use crate::config::{CronJobConfig, OverlapPolicy};
use crate::models::mission::{Mission, MissionFilter};
use crate::persistence::mission_repo::MissionRepo;
use crate::process::{ProcessProbe, ProcessSignal};
use crate::Result;

/// Liveness polling period during shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// A scheduled mission believed to be running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningCronMission {
    /// Job that started the mission.
    pub job_name: String,
    /// Mission record identifier.
    pub mission_id: String,
    /// PID of the mission's supervisor process.
    pub pid: u32,
    /// When the mission was started (or adopted).
    pub started_at: DateTime<Utc>,
}

/// Why a due job was not launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The job table could not be decoded.
    InvalidConfig(String),
    /// The schedule expression does not parse.
    InvalidSchedule(String),
    /// The job has no prompt.
    EmptyPrompt,
    /// The global concurrency cap is reached.
    ConcurrencyLimit,
    /// A mission for this job was already created in this minute.
    AlreadyFired,
    /// Overlap policy is `skip` and a previous run is still alive.
    Overlap,
    /// The mission store could not be consulted or written.
    Store(String),
    /// The mission process could not be started.
    LaunchFailed(String),
}

/// What one scheduler cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Entries pruned because their process was gone.
    pub removed: usize,
    /// Missions launched in this cycle.
    pub spawned: Vec<RunningCronMission>,
    /// Jobs that were due (or unparseable) but not launched.
    pub skipped: Vec<(String, SkipReason)>,
}

impl CycleReport {
    /// Skip reason recorded for `job`, if any.
    #[must_use]
    pub fn skip_reason(&self, job: &str) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|(name, _)| name == job)
            .map(|(_, reason)| reason)
    }
}

/// Evaluates jobs and tracks the scheduled missions it launched.
pub struct CronScheduler {
    source: Arc<dyn JobSource>,
    repo: MissionRepo,
    probe: Arc<dyn ProcessProbe>,
    launcher: Arc<dyn MissionLauncher>,
    missions_root: PathBuf,
    running: Mutex<BTreeMap<String, Vec<RunningCronMission>>>,
}

impl CronScheduler {
    /// Create a scheduler with an empty running table.
    #[must_use]
    pub fn new(
        source: Arc<dyn JobSource>,
        repo: MissionRepo,
        probe: Arc<dyn ProcessProbe>,
        launcher: Arc<dyn MissionLauncher>,
        missions_root: PathBuf,
    ) -> Self {
        Self {
            source,
            repo,
            probe,
            launcher,
            missions_root,
            running: Mutex::new(BTreeMap::new()),
        }
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<String, Vec<RunningCronMission>>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the running table, ordered by job name.
    #[must_use]
    pub fn running_missions(&self) -> Vec<RunningCronMission> {
        self.table().values().flatten().cloned().collect()
    }

    /// Number of tracked missions.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.table().values().map(Vec::len).sum()
    }

    /// Re-insert live scheduled missions recorded in the store.
    ///
    /// Returns the number of adopted missions. Missions already tracked are
    /// left alone, so calling this twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store cannot be queried.
    pub async fn adopt_orphans(&self) -> Result<usize> {
        let candidates = self
            .repo
            .list(&MissionFilter {
                cron_only: true,
                live_only: true,
                ..MissionFilter::default()
            })
            .await?;

        let mut table = self.table();
        let mut adopted = 0;
        for mission in candidates {
            let (Some(job_name), Some(pid)) = (mission.cron_job, mission.pid) else {
                continue;
            };
            if !self.probe.is_alive(pid) {
                continue;
            }

            let entries = table.entry(job_name.clone()).or_default();
            if entries.iter().any(|e| e.mission_id == mission.id) {
                continue;
            }
            info!(job = %job_name, mission_id = %mission.id, pid, "adopted running mission");
            entries.push(RunningCronMission {
                job_name,
                mission_id: mission.id,
                pid,
                started_at: mission.created_at,
            });
            adopted += 1;
        }
        Ok(adopted)
    }

    /// Drop entries whose process is gone. Returns how many were removed.
    pub fn cleanup_finished_missions(&self) -> usize {
        let mut table = self.table();
        let mut removed = 0;
        for entries in table.values_mut() {
            entries.retain(|entry| {
                let alive = self.probe.is_alive(entry.pid);
                if !alive {
                    debug!(job = %entry.job_name, mission_id = %entry.mission_id, pid = entry.pid, "mission finished");
                    removed += 1;
                }
                alive
            });
        }
        table.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Evaluate every job against `now` and launch the due ones.
    pub async fn run_cycle<Tz>(&self, now: DateTime<Tz>) -> CycleReport
    where
        Tz: TimeZone,
        Tz::Offset: Send + Sync,
    {
        let mut report = CycleReport {
            removed: self.cleanup_finished_missions(),
            ..CycleReport::default()
        };

        let config = self.source.snapshot();
        let limit = usize::try_from(config.max_concurrent).unwrap_or(usize::MAX);
        let mut running = self.running_count();
        let minute = now.timestamp().div_euclid(60);

        for (name, err) in &config.invalid_jobs {
            warn!(job = %name, %err, "skipping job with invalid config");
            report
                .skipped
                .push((name.clone(), SkipReason::InvalidConfig(err.clone())));
        }

        for (name, job) in &config.jobs {
            if !job.enabled {
                continue;
            }

            let schedule = match CronSchedule::parse(&job.schedule) {
                Ok(schedule) => schedule,
                Err(err) => {
                    warn!(job = %name, %err, "skipping job with invalid schedule");
                    report
                        .skipped
                        .push((name.clone(), SkipReason::InvalidSchedule(err.to_string())));
                    continue;
                }
            };
            if !schedule.matches(&now) {
                continue;
            }

            let skip = if job.prompt.trim().is_empty() {
                Some(SkipReason::EmptyPrompt)
            } else if running >= limit {
                Some(SkipReason::ConcurrencyLimit)
            } else {
                match self.fired_in_minute(name, minute).await {
                    Ok(true) => Some(SkipReason::AlreadyFired),
                    Ok(false) => (job.overlap == OverlapPolicy::Skip && self.is_tracked(name))
                        .then_some(SkipReason::Overlap),
                    Err(err) => Some(SkipReason::Store(err.to_string())),
                }
            };
            if let Some(reason) = skip {
                debug!(job = %name, ?reason, "due job skipped");
                report.skipped.push((name.clone(), reason));
                continue;
            }

            match self.launch(name, job, now.with_timezone(&Utc)).await {
                Ok(entry) => {
                    info!(job = %name, mission_id = %entry.mission_id, pid = entry.pid, "scheduled mission launched");
                    self.table()
                        .entry(name.clone())
                        .or_default()
                        .push(entry.clone());
                    report.spawned.push(entry);
                    running += 1;
                }
                Err(err) => {
                    warn!(job = %name, %err, "failed to launch scheduled mission");
                    report
                        .skipped
                        .push((name.clone(), SkipReason::LaunchFailed(err.to_string())));
                }
            }
        }
        report
    }

    fn is_tracked(&self, job_name: &str) -> bool {
        self.table()
            .get(job_name)
            .is_some_and(|entries| !entries.is_empty())
    }

    /// Whether the job's most recent mission was created in `minute`
    /// (minutes since the Unix epoch).
    async fn fired_in_minute(&self, job_name: &str, minute: i64) -> Result<bool> {
        let last = self.repo.most_recent_for_job(job_name).await?;
        Ok(last.is_some_and(|mission| mission.created_at.timestamp().div_euclid(60) == minute))
    }

    async fn launch(
        &self,
        job_name: &str,
        job: &CronJobConfig,
        due_at: DateTime<Utc>,
    ) -> Result<RunningCronMission> {
        let mut mission = Mission::new(&self.missions_root).for_cron_job(
            job_name,
            Uuid::new_v4().to_string(),
            &job.prompt,
        );
        if let Some(ref workspace) = job.workspace {
            mission = mission.with_workspace(workspace);
        }
        // Stamp the due minute so the double-fire check compares like with like.
        mission.created_at = due_at;
        let mission = self.repo.create(&mission).await?;

        let pid = match self.launcher.launch(&mission) {
            Ok(pid) => pid,
            Err(err) => {
                if let Err(mark_err) = self.repo.mark_finished(&mission.id, None).await {
                    warn!(mission_id = %mission.id, %mark_err, "failed to close unlaunched mission");
                }
                return Err(err);
            }
        };
        if let Err(err) = self.repo.set_pid(&mission.id, pid).await {
            warn!(mission_id = %mission.id, %err, "failed to record mission pid");
        }

        Ok(RunningCronMission {
            job_name: job_name.to_owned(),
            mission_id: mission.id,
            pid,
            started_at: Utc::now(),
        })
    }

    /// Interrupt every tracked live mission, wait up to `grace`, then kill
    /// the survivors. Returns the number of missions that had to be killed.
    ///
    /// The running table is left as is; the next cleanup prunes it.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let pids: Vec<u32> = self
            .running_missions()
            .into_iter()
            .map(|entry| entry.pid)
            .filter(|pid| self.probe.is_alive(*pid))
            .collect();
        if pids.is_empty() {
            return 0;
        }

        info!(count = pids.len(), "stopping scheduled missions");
        for pid in &pids {
            if let Err(err) = self.probe.signal(*pid, ProcessSignal::Interrupt) {
                debug!(pid, %err, "interrupt not delivered");
            }
        }

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let alive = pids.iter().any(|pid| self.probe.is_alive(*pid));
            if !alive || tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(SHUTDOWN_POLL).await;
        }

        let mut killed = 0;
        for pid in pids.iter().copied().filter(|pid| self.probe.is_alive(*pid)) {
            warn!(pid, "mission ignored interrupt, killing");
            match self.probe.signal(pid, ProcessSignal::Kill) {
                Ok(()) => killed += 1,
                Err(err) => warn!(pid, %err, "failed to kill mission"),
            }
        }
        killed
    }

    /// Daemon loop: adopt orphans, run a cycle at every tick boundary until
    /// `cancel` fires, then shut tracked missions down.
    pub async fn run(&self, cancel: CancellationToken) {
        let initial = self.source.snapshot();
        match self.adopt_orphans().await {
            Ok(adopted) => info!(adopted, "scheduler started"),
            Err(err) => warn!(%err, "orphan adoption failed"),
        }

        let tick = initial.tick_interval();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(until_next_tick(Local::now(), tick)) => {
                    let now = Local::now();
                    let report = self
                        .run_cycle(now)
                        .instrument(info_span!("cron_cycle", at = %now.format("%Y-%m-%d %H:%M")))
                        .await;
                    if !report.spawned.is_empty() || !report.skipped.is_empty() || report.removed > 0 {
                        info!(
                            spawned = report.spawned.len(),
                            skipped = report.skipped.len(),
                            removed = report.removed,
                            running = self.running_count(),
                            "cron cycle complete"
                        );
                    }
                }
            }
        }

        let killed = self.shutdown(self.source.snapshot().shutdown_grace()).await;
        info!(killed, "scheduler stopped");
    }
}

/// Time until the next wall-clock multiple of `tick`, plus a small margin so
/// the cycle lands inside the new minute.
fn until_next_tick(now: DateTime<Local>, tick: Duration) -> Duration {
    let tick_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX).max(1);
    let now_ms = u64::try_from(now.timestamp_millis()).unwrap_or(0);
    Duration::from_millis(tick_ms - now_ms % tick_ms + 50)
}
