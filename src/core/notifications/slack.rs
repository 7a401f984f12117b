use super::{NotificationChannel, RunEvent};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    fn format_message(&self, event: &RunEvent) -> serde_json::Value {
        match event {
            RunEvent::Completed {
                run_id,
                device,
                destination,
                mode,
                success,
                summary,
            } => {
                let short_id = &run_id[..8.min(run_id.len())];
                let header = if *success {
                    "Camera Sync Complete"
                } else {
                    "Camera Sync Finished With Errors"
                };
                json!({
                    "blocks": [
                        {
                            "type": "header",
                            "text": {
                                "type": "plain_text",
                                "text": header,
                                "emoji": true
                            }
                        },
                        {
                            "type": "section",
                            "fields": [
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Device:*\n`{}`", device.display())
                                },
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Run ID:*\n`{}`", short_id)
                                },
                                {
                                    "type": "mrkdwn",
                                    "text": format!(
                                        "*Files:*\n{} {}, {} skipped, {} failed",
                                        summary.succeeded,
                                        mode.past_tense(),
                                        summary.skipped,
                                        summary.failed
                                    )
                                },
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Size:*\n{:.1} MB", summary.megabytes())
                                },
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Destination:*\n`{}`", destination.display())
                                }
                            ]
                        }
                    ]
                })
            }
            RunEvent::Failed {
                run_id,
                device,
                error,
            } => {
                let short_id = &run_id[..8.min(run_id.len())];
                json!({
                    "blocks": [
                        {
                            "type": "header",
                            "text": {
                                "type": "plain_text",
                                "text": "Camera Sync Failed",
                                "emoji": true
                            }
                        },
                        {
                            "type": "section",
                            "fields": [
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Device:*\n`{}`", device.display())
                                },
                                {
                                    "type": "mrkdwn",
                                    "text": format!("*Run ID:*\n`{}`", short_id)
                                }
                            ]
                        },
                        {
                            "type": "section",
                            "text": {
                                "type": "mrkdwn",
                                "text": format!("*Error:*\n```{}```", error)
                            }
                        }
                    ]
                })
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for SlackNotifier {
    async fn notify(&self, event: RunEvent) -> Result<()> {
        let payload = self.format_message(&event);
        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{TransferMode, TransferSummary};
    use std::path::PathBuf;

    #[test]
    fn test_completed_message_fields() {
        let notifier = SlackNotifier::new("http://localhost/hook".to_string());
        let message = notifier.format_message(&RunEvent::Completed {
            run_id: "0190a1b2-c3d4".to_string(),
            device: PathBuf::from("/media/me/GOPRO"),
            destination: PathBuf::from("/archive"),
            mode: TransferMode::Copy,
            success: true,
            summary: TransferSummary {
                succeeded: 3,
                skipped: 1,
                ..Default::default()
            },
        });

        assert_eq!(message["blocks"][0]["text"]["text"], "Camera Sync Complete");
        let fields = message["blocks"][1]["fields"].as_array().unwrap();
        assert_eq!(fields[1]["text"], "*Run ID:*\n`0190a1b2`");
        assert_eq!(fields[2]["text"], "*Files:*\n3 copied, 1 skipped, 0 failed");
    }

    #[test]
    fn test_failed_message_includes_error() {
        let notifier = SlackNotifier::new("http://localhost/hook".to_string());
        let message = notifier.format_message(&RunEvent::Failed {
            run_id: "abc".to_string(),
            device: PathBuf::from("/media/me/GOPRO"),
            error: "destination not writable".to_string(),
        });

        assert_eq!(message["blocks"][0]["text"]["text"], "Camera Sync Failed");
        assert_eq!(
            message["blocks"][2]["text"]["text"],
            "*Error:*\n```destination not writable```"
        );
    }
}
