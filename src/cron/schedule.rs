//! Five-field cron expressions.
//!
//! Field grammar and matching come from `croner`, which follows Vixie cron:
//! `7` is an alias for Sunday, months and weekdays may be named, and when
//! both day-of-month and day-of-week are restricted a day matches if either
//! does. On top of that this module expands the `@yearly`, `@annually`,
//! `@monthly`, `@weekly`, `@daily`, `@midnight` and `@hourly` macros, insists
//! on exactly five fields, and matches at minute resolution.

use std::fmt;

use chrono::{DateTime, TimeZone, Timelike};
use croner::Cron;

use crate::{AppError, Result};

/// A parsed cron schedule.
pub struct CronSchedule {
    source: String,
    cron: Cron,
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.source).finish()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl CronSchedule {
    /// Parse a five-field expression or `@macro`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Schedule` if the expression has the wrong shape or
    /// any field is out of range.
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();
        let expanded = if trimmed.starts_with('@') {
            expand_macro(trimmed)?
        } else {
            trimmed
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(AppError::Schedule(format!(
                "expected 5 fields, got {} in '{trimmed}'",
                fields.len()
            )));
        }

        let cron = Cron::new(&fields.join(" ").to_ascii_uppercase())
            .parse()
            .map_err(|err| AppError::Schedule(format!("invalid expression '{trimmed}': {err}")))?;

        Ok(Self {
            source: trimmed.to_owned(),
            cron,
        })
    }

    /// Whether the schedule fires in the minute containing `at`.
    #[must_use]
    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        at.with_second(0)
            .and_then(|minute| minute.with_nanosecond(0))
            .is_some_and(|minute| self.cron.is_time_matching(&minute).unwrap_or(false))
    }

    /// Expression as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn expand_macro(raw: &str) -> Result<&'static str> {
    match raw.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        _ => Err(AppError::Schedule(format!("unknown macro '{raw}'"))),
    }
}
