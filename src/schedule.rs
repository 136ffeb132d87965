pub mod crontab;

use std::fmt;
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use error_stack::Report;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use crate::monitor::Monitor;

use crontab::CronSchedule;

/// When the next check runs. Fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub enum SchedulePolicy {
    /// Sleep this long after each completed check. Check duration is not
    /// subtracted, so the period is check time + interval.
    Interval(Duration),
    /// Sleep until the next trigger, recomputed from "now" after each check.
    Cron(CronSchedule),
}

impl SchedulePolicy {
    /// Build the policy; an unusable cron expression is an error.
    pub fn from_config(config: &ScheduleConfig) -> Result<Self, Report<ScheduleError>> {
        match config {
            ScheduleConfig::Interval { seconds } => Ok(Self::Interval(Duration::from_secs(*seconds))),
            ScheduleConfig::Cron {
                expression,
                utc_offset_hours,
            } => {
                let offset = utc_offset_hours
                    .checked_mul(3600)
                    .and_then(FixedOffset::east_opt)
                    .ok_or_else(|| {
                        Report::new(ScheduleError::InvalidOffset {
                            hours: *utc_offset_hours,
                        })
                    })?;
                let schedule = CronSchedule::parse(expression, offset)?;
                if schedule.next_after(Utc::now()).is_none() {
                    return Err(Report::new(ScheduleError::NeverFires {
                        expression: expression.clone(),
                    }));
                }
                Ok(Self::Cron(schedule))
            }
        }
    }

    /// How long to sleep after a check that finished at `now`. `None` when a
    /// cron schedule has no future trigger.
    pub fn wait_after_check(&self, now: chrono::DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::Interval(interval) => Some(*interval),
            Self::Cron(schedule) => {
                let next = schedule.next_after(now)?;
                // Negative when the clock moved; fire right away.
                Some(
                    (next.with_timezone(&Utc) - now)
                        .to_std()
                        .unwrap_or(Duration::ZERO),
                )
            }
        }
    }
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval(interval) => write!(f, "every {}s", interval.as_secs()),
            Self::Cron(schedule) => write!(f, "{schedule}"),
        }
    }
}

/// Run checks until `cancel` fires. The first check runs immediately; checks
/// never overlap. A failed check is logged and the loop carries on.
pub async fn run_loop(
    policy: &SchedulePolicy,
    monitor: &mut Monitor,
    cancel: &CancellationToken,
) -> Result<(), Report<ScheduleError>> {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = monitor.check_once() => {
                if let Err(e) = outcome {
                    warn!(error = ?e, "check failed, continuing");
                }
            }
        }

        let now = Utc::now();
        let Some(wait) = policy.wait_after_check(now) else {
            return Err(Report::new(ScheduleError::NeverFires {
                expression: policy.to_string(),
            }));
        };
        if let SchedulePolicy::Cron(schedule) = policy {
            if let Some(next) = schedule.next_after(now) {
                info!(next = %next, "next check scheduled");
            }
        }
        debug!(wait_secs = wait.as_secs_f64(), "sleeping until next check");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }
    }

    info!(checks = monitor.state().check_count, "monitor loop stopped");
    Ok(())
}

/// Run the loop until `cancel` fires, then release the fetcher and log how
/// long the monitor ran. The fetcher is shut down even when the loop fails.
pub async fn run_until_cancelled(
    policy: &SchedulePolicy,
    monitor: &mut Monitor,
    cancel: &CancellationToken,
) -> Result<(), Report<ScheduleError>> {
    let started = tokio::time::Instant::now();
    let result = run_loop(policy, monitor, cancel).await;
    monitor.shutdown().await;
    info!(elapsed = %format_elapsed(started.elapsed()), "monitor stopped");
    result
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
