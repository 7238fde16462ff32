//! Declarative run schedule and the loop that drives it.
//!
//! A schedule is either a set of fixed times of day (`cron`) or a recurring
//! interval. Times of day are parsed once, at the configuration boundary,
//! into typed [`TimeOfDay`] values; the scheduler only ever computes with
//! them. The scheduler itself is a single cooperative blocking loop: sleep
//! until the next fire instant, run the job to completion, recompute.

use crate::backup::result_error::result::Result;
use bon::Builder;
use chrono::{DateTime, Duration, Local, TimeZone};
use derive_more::{Display, From};
use getset::Getters;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Formatter;
use std::result;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use validator::{Validate, ValidationError, ValidationErrors};

/// A wall-clock time of day, only constructible through its validating parse.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Getters)]
#[display("{hour:02}:{minute:02}")]
#[getset(get = "pub")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid time of day {0:?}, expected \"HH:MM\"")]
pub struct ParseTimeOfDayError(String);

impl FromStr for TimeOfDay {
    type Err = ParseTimeOfDayError;

    fn from_str(s: &str) -> result::Result<Self, Self::Err> {
        let err = || ParseTimeOfDayError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        let hour: u8 = h.parse().map_err(|_| err())?;
        let minute: u8 = m.parse().map_err(|_| err())?;
        if hour > 23 || minute > 59 {
            return Err(err());
        }
        Ok(TimeOfDay { hour, minute })
    }
}

struct TimeOfDayVisitor;

impl Visitor<'_> for TimeOfDayVisitor {
    type Value = TimeOfDay;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a time of day in \"HH:MM\" form")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(TimeOfDayVisitor)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Fixed times-of-day schedule.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct CronSchedule {
    #[validate(length(min = 1, message = "at least one time of day is required"))]
    times: Vec<TimeOfDay>,
}

impl CronSchedule {
    /// Earliest armed time of day strictly after `after`.
    ///
    /// Computed in `after`'s own timezone; a time that does not exist on a
    /// given day (DST gap) falls through to the next day. `None` only when
    /// the schedule has no armed times.
    pub fn next_fire<T: TimeZone>(&self, after: &DateTime<T>) -> Option<DateTime<T>> {
        let tz = after.timezone();
        let mut next: Option<DateTime<T>> = None;
        for day_offset in 0..=2 {
            let date = after.date_naive() + Duration::days(day_offset);
            for time in &self.times {
                let Some(naive) = date.and_hms_opt((*time.hour()).into(), (*time.minute()).into(), 0)
                else {
                    continue;
                };
                let Some(candidate) = tz.from_local_datetime(&naive).earliest() else {
                    continue;
                };
                if candidate > *after && next.as_ref().map_or(true, |n| candidate < *n) {
                    next = Some(candidate);
                }
            }
        }
        next
    }
}

/// Recurring interval schedule. All components default to zero; validation
/// rejects an interval that sums to zero.
#[derive(Clone, Default, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_interval_not_zero))]
#[getset(get = "pub")]
pub struct IntervalSchedule {
    #[serde(default)]
    #[builder(default)]
    days: u64,
    #[serde(default)]
    #[builder(default)]
    hours: u64,
    #[serde(default)]
    #[builder(default)]
    minutes: u64,
    #[serde(default)]
    #[builder(default)]
    seconds: u64,
}

fn validate_interval_not_zero(
    interval: &IntervalSchedule,
) -> result::Result<(), ValidationError> {
    if interval.period() <= Duration::zero() {
        return Err(ValidationError::new("EmptyInterval")
            .with_message("interval must be greater than zero".into()));
    }

    Ok(())
}

impl IntervalSchedule {
    pub fn period(&self) -> Duration {
        let secs = self.days * 86_400 + self.hours * 3_600 + self.minutes * 60 + self.seconds;
        Duration::seconds(secs.min((i64::MAX / 1_000) as u64) as i64)
    }
}

#[derive(Clone, From, Serialize, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSpec {
    Cron(CronSchedule),
    Interval(IntervalSchedule),
}

impl Validate for ScheduleSpec {
    fn validate(&self) -> result::Result<(), ValidationErrors> {
        match self {
            ScheduleSpec::Cron(cron) => cron.validate(),
            ScheduleSpec::Interval(interval) => interval.validate(),
        }
    }
}

static POLL_SLICE: std::time::Duration = std::time::Duration::from_millis(500);

/// Translates a [`ScheduleSpec`] into a sequence of due instants, running the
/// job synchronously at each. One job at a time: the next fire is only
/// computed after the previous run completed. The shutdown flag stops arming
/// further fires; a run already in flight finishes naturally.
pub struct Scheduler {
    schedule: ScheduleSpec,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(schedule: ScheduleSpec, shutdown: Arc<AtomicBool>) -> Self {
        Self { schedule, shutdown }
    }

    pub fn run<F>(&self, mut job: F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        // Interval schedules fire immediately on start; cron schedules arm
        // for their next time of day.
        let mut next = match &self.schedule {
            ScheduleSpec::Interval(_) => Local::now(),
            ScheduleSpec::Cron(cron) => match cron.next_fire(&Local::now()) {
                Some(next) => next,
                None => {
                    warn!("Schedule has no armed times, nothing to run");
                    return Ok(());
                }
            },
        };
        info!("First run scheduled at {next}");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("Shutdown requested, not arming further runs");
                return Ok(());
            }

            let now = Local::now();
            if now < next {
                let remaining = (next - now).to_std().unwrap_or(POLL_SLICE);
                std::thread::sleep(remaining.min(POLL_SLICE));
                continue;
            }

            if let Err(e) = job() {
                error!("Backup run failed: {e}");
            }

            let Some(rearmed) = self.rearm(next) else {
                warn!("Schedule has no armed times, nothing further to run");
                return Ok(());
            };
            next = rearmed;
            info!("Next run scheduled at {next}");
        }
    }

    /// Recomputes the next fire after a run that was armed for `fired_at`.
    /// A run that overran its successor instant logs a misfire and skips to
    /// the next future instant, so runs never overlap.
    fn rearm(&self, fired_at: DateTime<Local>) -> Option<DateTime<Local>> {
        let completed = Local::now();
        match &self.schedule {
            ScheduleSpec::Interval(interval) => {
                let planned = fired_at + interval.period();
                if planned <= completed {
                    warn!("Run overran the schedule, missed fire at {planned}; re-arming from now");
                    Some(completed + interval.period())
                } else {
                    Some(planned)
                }
            }
            ScheduleSpec::Cron(cron) => {
                if let Some(planned) = cron.next_fire(&fired_at) {
                    if planned <= completed {
                        warn!("Run overran the schedule, missed fire at {planned}");
                    }
                }
                cron.next_fire(&completed)
            }
        }
    }
}
