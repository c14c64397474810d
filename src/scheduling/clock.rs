use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tokio::time::{self, Interval, MissedTickBehavior};

/// How often the scheduler looks at the wall clock.
pub const TICK_RESOLUTION: Duration = Duration::from_secs(1);

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the wall clock of the host, or of a fixed IANA timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    timezone: Option<Tz>,
}

impl SystemClock {
    pub fn new(timezone: Option<Tz>) -> Self {
        Self { timezone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.timezone {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

#[async_trait]
pub trait Ticker: Send {
    /// Waits for the next tick and returns the wall-clock time it landed on.
    async fn tick(&mut self) -> NaiveDateTime;
}

/// Ticks every [`TICK_RESOLUTION`]. The first tick completes immediately.
pub struct IntervalTicker {
    interval: Interval,
    clock: Arc<dyn Clock>,
}

impl IntervalTicker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let mut interval = time::interval(TICK_RESOLUTION);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self { interval, clock }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> NaiveDateTime {
        self.interval.tick().await;
        self.clock.now()
    }
}
