//! Cron-triggered headless missions.
//!
//! [`scheduler::CronScheduler`] decides when to start a mission;
//! [`launcher::MissionLauncher`] starts the independent process that
//! supervises it. The two never call each other afterwards: the scheduler
//! only sees missions through the store and PID liveness.

pub mod launcher;
pub mod schedule;
pub mod scheduler;
pub mod source;

pub use launcher::{ExeLauncher, MissionLauncher};
pub use schedule::CronSchedule;
pub use scheduler::{CronScheduler, CycleReport, RunningCronMission, SkipReason};
pub use source::{FileJobSource, JobSource, StaticJobSource};
