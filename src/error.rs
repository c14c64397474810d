use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error("Invalid reminder configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to play sound: {0:#}")]
    Playback(anyhow::Error),

    #[error("Failed to show notification: {0:#}")]
    Notification(anyhow::Error),
}

impl ReminderError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}
