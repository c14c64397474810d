use async_trait::async_trait;

use crate::error::ReminderError;

/// Plays the reminder sound.
///
/// `play` may be called again while a previous call is still running;
/// implementations serialise access to the output device themselves.
#[async_trait]
pub trait SoundPlayer: Send + Sync + 'static {
    /// Resolves once playback finished. A disabled player returns `Ok` at once.
    async fn play(&self) -> Result<(), ReminderError>;

    /// Best effort: cuts short whatever is playing right now.
    fn stop(&self);
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self) -> Result<(), ReminderError>;
}
