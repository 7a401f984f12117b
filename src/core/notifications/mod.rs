mod desktop;
mod slack;

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{NotificationChannelType, NotificationConfig};
use crate::core::models::{TransferMode, TransferSummary};

pub use desktop::DesktopNotifier;
pub use slack::SlackNotifier;

/// Events that trigger notifications
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The transfer cycle ran to the end. `success` comes from the configured policy.
    Completed {
        run_id: String,
        device: PathBuf,
        destination: PathBuf,
        mode: TransferMode,
        success: bool,
        summary: TransferSummary,
    },
    /// The device was found but the run could not proceed.
    Failed {
        run_id: String,
        device: PathBuf,
        error: String,
    },
}

impl RunEvent {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { success: true, .. })
    }

    /// Headline shown by every channel.
    pub fn title(&self) -> &'static str {
        if self.is_success() {
            "Status: Successful"
        } else {
            "Status: Failed"
        }
    }

    /// Multi-line human readable body.
    pub fn body(&self) -> String {
        match self {
            Self::Completed {
                destination,
                mode,
                summary,
                ..
            } => {
                let mut body = format!(
                    "Progress: {}/{} files {}\nTotal {:.2} MB transferred to {}",
                    summary.succeeded,
                    summary.attempted(),
                    mode.past_tense(),
                    summary.megabytes(),
                    destination.display()
                );
                if summary.failed > 0 {
                    body.push_str(&format!("\n{} file(s) failed", summary.failed));
                }
                body
            }
            Self::Failed { error, .. } => {
                format!("Progress: 0/0 files processed\n{}", error)
            }
        }
    }
}

/// Trait for notification channel implementations (desktop, Slack, etc.)
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, event: RunEvent) -> Result<()>;
}

/// Factory function to create a notifier based on config
pub fn create_notifier(config: &NotificationConfig) -> Option<Arc<dyn NotificationChannel>> {
    if !config.enabled {
        return None;
    }

    match &config.channel {
        NotificationChannelType::None => None,
        NotificationChannelType::Desktop => Some(Arc::new(DesktopNotifier::default())),
        NotificationChannelType::Slack => {
            let webhook = config.slack_webhook.as_ref()?;
            if webhook.is_empty() {
                return None;
            }
            Some(Arc::new(SlackNotifier::new(webhook.clone())))
        }
    }
}

/// Deliver `event`, giving up after `timeout`. Never fails the caller.
pub async fn notify_best_effort(
    channel: &dyn NotificationChannel,
    event: RunEvent,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, channel.notify(event)).await {
        Ok(Ok(())) => debug!("Notification sent"),
        Ok(Err(e)) => warn!(error = %e, "Failed to send notification"),
        Err(_) => warn!(timeout_ms = timeout.as_millis() as u64, "Notification timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(success: bool, failed: u64) -> RunEvent {
        RunEvent::Completed {
            run_id: "0190-run".to_string(),
            device: PathBuf::from("/media/me/GOPRO"),
            destination: PathBuf::from("/archive"),
            mode: TransferMode::Copy,
            success,
            summary: TransferSummary {
                succeeded: 2,
                failed,
                bytes: 3 * 1024 * 1024,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_completed_body() {
        let event = completed(true, 0);
        assert_eq!(event.title(), "Status: Successful");
        assert_eq!(
            event.body(),
            "Progress: 2/2 files copied\nTotal 3.00 MB transferred to /archive"
        );
    }

    #[test]
    fn test_partial_failure_body() {
        let event = completed(false, 1);
        assert_eq!(event.title(), "Status: Failed");
        assert!(event.body().starts_with("Progress: 2/3 files copied"));
        assert!(event.body().ends_with("1 file(s) failed"));
    }

    #[test]
    fn test_disabled_notifications_have_no_channel() {
        let config = NotificationConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(create_notifier(&config).is_none());
    }

    #[test]
    fn test_slack_without_webhook_has_no_channel() {
        let config = NotificationConfig {
            channel: NotificationChannelType::Slack,
            slack_webhook: Some(String::new()),
            ..Default::default()
        };
        assert!(create_notifier(&config).is_none());
    }

    struct Stuck;

    #[async_trait]
    impl NotificationChannel for Stuck {
        async fn notify(&self, _event: RunEvent) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl NotificationChannel for Broken {
        async fn notify(&self, _event: RunEvent) -> Result<()> {
            anyhow::bail!("no notification daemon")
        }
    }

    #[tokio::test]
    async fn test_best_effort_swallows_errors_and_timeouts() {
        notify_best_effort(&Broken, completed(true, 0), Duration::from_secs(1)).await;
        notify_best_effort(&Stuck, completed(true, 0), Duration::from_millis(20)).await;
    }
}
