use std::{collections::BTreeSet, fmt, time::Duration};

use chrono::{NaiveDateTime, Timelike};

use crate::{duration::parse_duration, error::ReminderError};

pub const DEFAULT_INTERVAL_MINUTES: u32 = 30;

/// Reminder timing as configured, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderConfig {
    pub interval: String,
    pub trigger_minutes: Vec<u32>,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            interval: format!("{DEFAULT_INTERVAL_MINUTES}m"),
            trigger_minutes: Vec::new(),
        }
    }
}

/// Wall-clock minute a reminder fired in. Seconds and sub-seconds are always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FireMinute(NaiveDateTime);

impl FireMinute {
    pub fn new(inner: NaiveDateTime) -> Self {
        let normalized = inner
            .with_nanosecond(0)
            .and_then(|time| time.with_second(0))
            .expect("Zero seconds and nanoseconds are always valid.");
        Self(normalized)
    }

    pub fn time(&self) -> &NaiveDateTime {
        &self.0
    }

    pub fn into_time(self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for FireMinute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerMode {
    /// Fire when the wall-clock minute is one of these.
    Minutes(BTreeSet<u32>),
    /// Fire when the wall-clock minute is a multiple of this many minutes.
    Interval { minutes: u32 },
}

/// Validated form of [`ReminderConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderSchedule {
    interval: Duration,
    mode: TriggerMode,
}

impl ReminderSchedule {
    pub fn from_config(config: &ReminderConfig) -> Result<Self, ReminderError> {
        let interval = parse_duration(&config.interval).map_err(|error| {
            ReminderError::invalid_config(format!(
                "interval {:?} is malformed: {error}",
                config.interval
            ))
        })?;

        if interval.is_zero() {
            return Err(ReminderError::invalid_config(format!(
                "interval {:?} must be greater than zero",
                config.interval
            )));
        }

        if let Some(minute) = config.trigger_minutes.iter().find(|minute| **minute > 59) {
            return Err(ReminderError::invalid_config(format!(
                "trigger minute {minute} is outside 0..=59"
            )));
        }

        let mode = if config.trigger_minutes.is_empty() {
            TriggerMode::Interval {
                minutes: interval_minutes(interval),
            }
        } else {
            TriggerMode::Minutes(config.trigger_minutes.iter().copied().collect())
        };

        Ok(Self { interval, mode })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn mode(&self) -> &TriggerMode {
        &self.mode
    }
}

impl fmt::Display for ReminderSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.mode {
            TriggerMode::Minutes(minutes) => {
                let minutes = minutes
                    .iter()
                    .map(|minute| format!(":{minute:02}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "at minutes {minutes} of every hour")
            }
            TriggerMode::Interval { minutes } => write!(f, "every {minutes} minutes"),
        }
    }
}

/// Whole minutes in `interval`. Sub-minute intervals fall back to the default,
/// minute granularity being the finest the scheduler resolves.
fn interval_minutes(interval: Duration) -> u32 {
    match u32::try_from(interval.as_secs() / 60) {
        Ok(0) => DEFAULT_INTERVAL_MINUTES,
        Ok(minutes) => minutes,
        Err(_) => u32::MAX,
    }
}
