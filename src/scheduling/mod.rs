mod clock;
mod delivery;
mod policy;
mod scheduler;

pub use clock::{Clock, IntervalTicker, SystemClock, TICK_RESOLUTION, Ticker};
pub use delivery::{Notifier, SoundPlayer};
pub use policy::{next_trigger, should_trigger};
pub use scheduler::ReminderScheduler;
