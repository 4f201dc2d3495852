#![forbid(unsafe_code)]

//! Supervision and scheduling of long-running coding-agent missions.
//!
//! A mission is one supervised run of an agent CLI. [`supervisor`] owns a
//! mission's agent process and restarts it on request; [`cron`] launches
//! headless missions on a schedule. The two only meet through the mission
//! store in [`persistence`] and PID liveness from [`process`].

pub mod config;
pub mod cron;
pub mod errors;
pub mod ipc;
pub mod journal;
pub mod models;
pub mod persistence;
pub mod process;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
