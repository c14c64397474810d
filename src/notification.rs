use anyhow::Context;
use async_trait::async_trait;
use notify_rust::Notification;
use tokio::task;

use crate::{appsettings::NotificationSettings, error::ReminderError, scheduling::Notifier};

const APP_NAME: &str = "Rest Reminder";

pub struct DesktopNotifier {
    settings: NotificationSettings,
}

impl DesktopNotifier {
    pub fn new(settings: NotificationSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn notify(&self) -> Result<(), ReminderError> {
        if !self.settings.desktop {
            log::debug!("Desktop notifications are disabled, skipping.");
            return Ok(());
        }

        log::debug!(
            "Showing desktop notification. [title = {}, message = {}]",
            self.settings.title,
            self.settings.message
        );

        let title = self.settings.title.clone();
        let message = self.settings.message.clone();
        // Blocks on the platform notification service.
        let shown = task::spawn_blocking(move || {
            Notification::new()
                .appname(APP_NAME)
                .summary(&title)
                .body(&message)
                .show()
                .map(|_| ())
        })
        .await
        .context("Notification task did not complete")
        .and_then(|shown| shown.context("Notification service rejected the notification"));

        shown.map_err(ReminderError::Notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_notifier_does_nothing() {
        let notifier = DesktopNotifier::new(NotificationSettings {
            desktop: false,
            ..Default::default()
        });

        assert!(notifier.notify().await.is_ok());
    }
}
