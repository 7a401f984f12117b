use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::core::hardware::DeviceHint;
use crate::core::models::{TransferMode, TransferSummary};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/camsync/config.toml";
pub const ENV_PREFIX: &str = "CAMSYNC_";

const DEFAULT_SOUND: &str = "/usr/share/sounds/freedesktop/stereo/complete.oga";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub destination_directory: PathBuf,
    pub mode: TransferMode,
    pub poll_interval_ms: u64,
    /// Give up waiting for the device after this long
    pub max_wait_ms: u64,
    /// Upper bound for a single mount lookup
    pub resolve_timeout_ms: u64,
    /// Preferred media directory on the device; empty uses the mount root
    pub source_subdir: String,
    pub sync_files: bool,
    pub verbose: bool,
    pub json_logs: bool,
    pub log_file: Option<PathBuf>,
    pub simulation: bool,
    pub device: DeviceHint,
    pub notifications: NotificationConfig,
    pub sound: SoundConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let destination_directory = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join("Videos").join("GoPro"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/camsync/archive"));

        Self {
            destination_directory,
            mode: TransferMode::Copy,
            poll_interval_ms: 1000,
            max_wait_ms: 7000,
            resolve_timeout_ms: 2000,
            source_subdir: "DCIM".to_string(),
            sync_files: true,
            verbose: false,
            json_logs: false,
            log_file: None,
            simulation: false,
            device: DeviceHint::default(),
            notifications: NotificationConfig::default(),
            sound: SoundConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannelType {
    None,
    #[default]
    Desktop,
    Slack,
}

/// When a finished run counts as a success for notifications and the sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyPolicy {
    /// Zero failed transfers, even if nothing was new
    #[default]
    NoFailures,
    /// At least one transfer succeeded and none failed
    Strict,
    /// At least one transfer succeeded
    AnySuccess,
}

impl NotifyPolicy {
    pub fn is_success(&self, summary: &TransferSummary) -> bool {
        match self {
            Self::NoFailures => summary.failed == 0,
            Self::Strict => summary.succeeded > 0 && summary.failed == 0,
            Self::AnySuccess => summary.succeeded > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub channel: NotificationChannelType,
    pub slack_webhook: Option<String>,
    pub policy: NotifyPolicy,
    pub timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: NotificationChannelType::Desktop,
            slack_webhook: None,
            policy: NotifyPolicy::NoFailures,
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for SoundConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from(DEFAULT_SOUND),
        }
    }
}

/// Values given on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<TransferMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_logs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<SoundOverrides>,
}

#[derive(Debug, Default, Serialize)]
pub struct DeviceOverrides {
    pub labels: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct NotificationOverrides {
    pub enabled: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct SoundOverrides {
    pub path: PathBuf,
}

impl AppConfig {
    /// Load configuration: defaults, then the TOML file, then `CAMSYNC_*`
    /// environment variables, then command line overrides.
    pub fn new(config_path: Option<&Path>, overrides: Option<&CliOverrides>) -> Result<Self> {
        let path = match config_path {
            Some(p) if !p.exists() => bail!("Config file {} does not exist", p.display()),
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment
            .extract()
            .context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.destination_directory.as_os_str().is_empty() {
            bail!("destination_directory must not be empty");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.resolve_timeout_ms == 0 {
            bail!("resolve_timeout_ms must be greater than zero");
        }
        self.device
            .matcher(0)
            .context("Invalid device label pattern")?;
        if self.notifications.channel == NotificationChannelType::Slack
            && self.notifications.slack_webhook.as_deref().unwrap_or("").is_empty()
        {
            bail!("notifications.slack_webhook is required for the slack channel");
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
