use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures that end a run. Per-file problems never become a `SyncError`;
/// they are recorded as outcomes and the run carries on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("device not found after waiting {}s", .waited.as_secs())]
    DeviceNotFound { waited: Duration },

    #[error("run cancelled")]
    Cancelled,

    #[error("destination {} is not writable: {source}", .path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mount resolution failed: {0}")]
    Resolver(#[source] anyhow::Error),

    #[error("reconciliation worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::DeviceNotFound { .. } => 2,
            Self::DestinationUnwritable { .. } => 4,
            Self::Cancelled => 130,
            Self::Resolver(_) | Self::Worker(_) => 1,
        }
    }
}
