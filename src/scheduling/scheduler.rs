use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    error::ReminderError,
    reminder::{FireMinute, ReminderConfig, ReminderSchedule},
};

use super::{
    clock::{Clock, IntervalTicker, SystemClock, Ticker},
    delivery::{Notifier, SoundPlayer},
    policy::{next_trigger, should_trigger},
};

/// Fire bookkeeping. Lives on the tick loop's stack and is never shared.
#[derive(Debug, Default)]
struct SchedulerState {
    last_fire_minute: Option<FireMinute>,
}

impl SchedulerState {
    fn record_fire(&mut self, now: NaiveDateTime) {
        self.last_fire_minute = Some(FireMinute::new(now));
    }
}

pub struct ReminderScheduler {
    config: ReminderConfig,
    player: Arc<dyn SoundPlayer>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    dispatches: TaskTracker,
}

impl ReminderScheduler {
    pub fn new(
        config: ReminderConfig,
        player: Arc<dyn SoundPlayer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            player,
            notifier,
            clock: Arc::new(SystemClock::default()),
            dispatches: TaskTracker::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fire dispatches spawned so far. Closed once `run` returns; await
    /// [`TaskTracker::wait`] on it to drain reminders still playing.
    pub fn dispatches(&self) -> &TaskTracker {
        &self.dispatches
    }

    /// Runs the one-second tick loop until `cancellation_token` is cancelled.
    ///
    /// Fails only with [`ReminderError::InvalidConfig`], before the first tick.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<(), ReminderError> {
        let schedule = ReminderSchedule::from_config(&self.config)?;
        let ticker = IntervalTicker::new(Arc::clone(&self.clock));

        self.tick_loop(schedule, ticker, cancellation_token).await
    }

    /// Same as [`run`](Self::run), driven by `ticker` instead of the scheduler's clock.
    pub async fn run_with_ticker(
        &self,
        ticker: impl Ticker,
        cancellation_token: CancellationToken,
    ) -> Result<(), ReminderError> {
        let schedule = ReminderSchedule::from_config(&self.config)?;

        self.tick_loop(schedule, ticker, cancellation_token).await
    }

    async fn tick_loop(
        &self,
        schedule: ReminderSchedule,
        mut ticker: impl Ticker,
        cancellation_token: CancellationToken,
    ) -> Result<(), ReminderError> {
        log::info!(
            "Scheduler started. [schedule = {}, interval = {:?}]",
            schedule,
            schedule.interval()
        );

        let mut state = SchedulerState::default();
        loop {
            tokio::select! {
                biased;
                _ = cancellation_token.cancelled() => {
                    log::info!("Scheduler stopping. [in_flight = {}]", self.dispatches.len());
                    break;
                }
                now = ticker.tick() => {
                    if should_trigger(now, state.last_fire_minute, &schedule) {
                        state.record_fire(now);
                        self.dispatch(now);

                        if let Some(next) = next_trigger(now, state.last_fire_minute, &schedule) {
                            log::debug!("Next reminder scheduled. [at = {next}]");
                        }
                    }
                }
            }
        }

        self.dispatches.close();
        Ok(())
    }

    fn dispatch(&self, fired_at: NaiveDateTime) {
        log::info!(
            "Reminder triggered. [time = {}]",
            fired_at.format("%H:%M:%S")
        );

        let player = Arc::clone(&self.player);
        let notifier = Arc::clone(&self.notifier);
        self.dispatches.spawn(fire(player, notifier, fired_at));
    }
}

async fn fire(player: Arc<dyn SoundPlayer>, notifier: Arc<dyn Notifier>, fired_at: NaiveDateTime) {
    let (played, notified) = tokio::join!(player.play(), notifier.notify());

    if let Err(error) = played {
        log::error!("{error}. [fired_at = {}]", fired_at.format("%H:%M:%S"));
    }

    if let Err(error) = notified {
        log::error!("{error}. [fired_at = {}]", fired_at.format("%H:%M:%S"));
    }
}
