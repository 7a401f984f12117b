use super::{NotificationChannel, RunEvent};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Desktop notifications through `notify-send` (libnotify).
pub struct DesktopNotifier {
    program: String,
    app_name: String,
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self {
            program: "notify-send".to_string(),
            app_name: "camsync".to_string(),
        }
    }
}

impl DesktopNotifier {
    fn args(&self, event: &RunEvent) -> Vec<String> {
        let icon = if event.is_success() {
            "camera-photo"
        } else {
            "dialog-error"
        };

        vec![
            format!("--app-name={}", self.app_name),
            format!("--icon={}", icon),
            event.title().to_string(),
            event.body(),
        ]
    }
}

#[async_trait]
impl NotificationChannel for DesktopNotifier {
    async fn notify(&self, event: RunEvent) -> Result<()> {
        let status = Command::new(&self.program)
            .args(self.args(&event))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}
