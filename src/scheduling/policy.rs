use chrono::{NaiveDateTime, TimeDelta, Timelike};

use crate::reminder::{FireMinute, ReminderSchedule, TriggerMode};

const MINUTES_PER_HOUR: u32 = 60;

/// Decides whether a reminder fires at `now`.
///
/// At most one fire per wall-clock minute: if `last_fire_minute` is the minute
/// `now` falls in, the answer is always `false`. Otherwise the minute of the
/// hour is matched against the schedule. Seconds are not looked at, so any tick
/// landing inside a trigger minute qualifies.
pub fn should_trigger(
    now: NaiveDateTime,
    last_fire_minute: Option<FireMinute>,
    schedule: &ReminderSchedule,
) -> bool {
    if last_fire_minute == Some(FireMinute::new(now)) {
        return false;
    }

    let minute = now.minute();
    match schedule.mode() {
        TriggerMode::Minutes(minutes) => minutes.contains(&minute),
        TriggerMode::Interval { minutes } => minute % minutes == 0,
    }
}

/// First minute, starting with the one `now` falls in, at which
/// [`should_trigger`] fires. `None` only at the far end of chrono's range.
pub fn next_trigger(
    now: NaiveDateTime,
    last_fire_minute: Option<FireMinute>,
    schedule: &ReminderSchedule,
) -> Option<FireMinute> {
    if should_trigger(now, last_fire_minute, schedule) {
        return Some(FireMinute::new(now));
    }

    let mut candidate = FireMinute::new(now).into_time();
    for _ in 0..=MINUTES_PER_HOUR {
        candidate = candidate.checked_add_signed(TimeDelta::minutes(1))?;
        if should_trigger(candidate, last_fire_minute, schedule) {
            return Some(FireMinute::new(candidate));
        }
    }

    None
}
