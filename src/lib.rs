pub mod appsettings;
pub mod audio;
pub mod duration;
pub mod error;
pub mod notification;
pub mod reminder;
pub mod scheduling;

pub use error::ReminderError;
