//! Resident mode: run the pipeline on a cron schedule.
//!
//! Supports both 5-field (standard cron) and 6-field (with seconds)
//! expressions; fire times are computed in the configured timezone. Runs
//! happen one after another on the calling task, so a slow run delays the
//! next tick instead of overlapping it.

use crate::config::Config;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Prepend a seconds field to 5-field expressions.
pub fn normalize_cron(expr: &str) -> String {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

pub fn parse_cron(expr: &str) -> Result<Schedule, String> {
    Schedule::from_str(&normalize_cron(expr)).map_err(|e| format!("{expr:?}: {e}"))
}

/// Next fire time strictly after `after`, evaluated in `tz`.
pub fn next_run(schedule: &Schedule, tz: Tz, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&after.with_timezone(&tz))
        .next()
        .map(|t| t.with_timezone(&Utc))
}

/// Invoke `run_once` at every fire time until the schedule is exhausted.
///
/// `run_once` reports success as a `bool`; the loop continues after failures.
#[instrument(level = "info", skip_all, fields(cron = %config.schedule.expression, tz = %config.report.timezone))]
pub async fn run_on_schedule<F, Fut>(config: &Config, mut run_once: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let tz = config.report.timezone;
    loop {
        let now = Utc::now();
        let Some(next) = next_run(&config.schedule.schedule, tz, now) else {
            warn!("Schedule has no upcoming fire times; stopping");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next.with_timezone(&tz), wait_secs = wait.as_secs(), "Waiting for next scheduled run");
        sleep(wait).await;

        if run_once().await {
            info!("Scheduled run succeeded");
        } else {
            error!("Scheduled run failed; will try again at the next tick");
        }
    }
}
