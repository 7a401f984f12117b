use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::SyncError;
use super::models::{
    SkipReason, TransferErrorKind, TransferMode, TransferOutcome, TransferReport, TransferTask,
    partial_name,
};
use super::planner::TransferPlan;
use super::transfer_engine::{CopyError, TransferEngine};
use super::verifier::verify_size;
use crate::logging::LogThrottle;

/// Minimum time between progress lines that are not on a 10-file boundary.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// Runs a [`TransferPlan`], one file at a time.
///
/// Every task is attempted independently: a failure is recorded in the
/// report and the next task still runs. Only an unusable destination root
/// stops the run, and that is checked before the first file.
pub struct TransferExecutor {
    engine: Arc<dyn TransferEngine>,
    mode: TransferMode,
    cancel: CancellationToken,
}

impl TransferExecutor {
    pub fn new(engine: Arc<dyn TransferEngine>, mode: TransferMode) -> Self {
        Self {
            engine,
            mode,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new transfers once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn execute(
        &self,
        destination_root: &Path,
        plan: TransferPlan,
    ) -> Result<TransferReport, SyncError> {
        ensure_destination(destination_root)?;

        let mut report = TransferReport::default();
        report.summary.unreadable = plan.unreadable.len() as u64;
        for skipped in plan.skipped {
            report.push(skipped);
        }

        let total = plan.tasks.len();
        let throttle = LogThrottle::new(PROGRESS_LOG_INTERVAL);
        let start = Instant::now();

        info!(
            new_files = total,
            mode = self.mode.past_tense(),
            destination = %destination_root.display(),
            "Starting transfers"
        );

        for (i, task) in plan.tasks.iter().enumerate() {
            let outcome = self.run_task(task);
            log_outcome(&outcome);
            report.push(outcome);

            let done = i + 1;
            if done == total || done % 10 == 0 || throttle.should_log() {
                info!(
                    "Progress: {}/{} files {} ({:.2} MB)",
                    report.summary.succeeded,
                    total,
                    self.mode.past_tense(),
                    report.summary.megabytes()
                );
            }
        }

        info!(
            succeeded = report.summary.succeeded,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            unreadable = report.summary.unreadable,
            bytes = report.summary.bytes,
            duration_secs = start.elapsed().as_secs(),
            "Transfers finished"
        );

        Ok(report)
    }

    fn run_task(&self, task: &TransferTask) -> TransferOutcome {
        let source = task.source.path.clone();
        let destination = task.destination.clone();

        if self.cancel.is_cancelled() {
            return TransferOutcome::Failed {
                source,
                destination,
                kind: TransferErrorKind::Cancelled,
                message: "Run cancelled before transfer started".to_string(),
            };
        }

        // Another run may have written it since planning
        if destination.exists() {
            return TransferOutcome::Skipped {
                source,
                destination,
                reason: SkipReason::AlreadyExists,
            };
        }

        match self.transfer(task) {
            Ok(bytes) => TransferOutcome::Succeeded {
                source,
                destination,
                bytes,
            },
            Err(e) => TransferOutcome::Failed {
                source,
                destination,
                kind: e.kind,
                message: e.message,
            },
        }
    }

    /// Copy into a hidden partial file, verify, rename into place, then
    /// (move mode) remove the source.
    fn transfer(&self, task: &TransferTask) -> Result<u64, CopyError> {
        let source = &task.source.path;
        let destination = &task.destination;
        let bucket_dir = destination.parent().ok_or_else(|| {
            CopyError::new(TransferErrorKind::Io, "Destination has no parent directory")
        })?;

        self.engine
            .prepare_dir(bucket_dir)
            .map_err(|e| CopyError::io("Failed to create bucket directory", &e))?;

        let partial = bucket_dir.join(partial_name(task.source.file_name()));

        let bytes = self
            .engine
            .copy_file(source, &partial)
            .and_then(|_| verify_size(source, &partial))
            .and_then(|bytes| {
                fs::rename(&partial, destination)
                    .map(|_| bytes)
                    .map_err(|e| CopyError::io("Failed to move copy into place", &e))
            })
            .inspect_err(|_| discard_partial(&partial))?;

        if self.mode == TransferMode::Move {
            fs::remove_file(source).map_err(|e| {
                CopyError::new(
                    TransferErrorKind::SourceNotRemoved,
                    format!("Copied but failed to remove source: {}", e),
                )
            })?;
        }

        Ok(bytes)
    }
}

/// Create the archive root if needed and prove we can write into it.
pub fn ensure_destination(root: &Path) -> Result<(), SyncError> {
    let unwritable = |source: std::io::Error| SyncError::DestinationUnwritable {
        path: root.to_path_buf(),
        source,
    };

    fs::create_dir_all(root).map_err(unwritable)?;

    let probe = root.join(format!(".camsync-probe-{}", std::process::id()));
    fs::write(&probe, b"").map_err(unwritable)?;
    fs::remove_file(&probe).map_err(unwritable)?;

    Ok(())
}

fn discard_partial(partial: &Path) {
    if let Err(e) = fs::remove_file(partial) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %partial.display(), error = %e, "Failed to remove partial file");
        }
    }
}

fn log_outcome(outcome: &TransferOutcome) {
    match outcome {
        TransferOutcome::Succeeded {
            source,
            destination,
            bytes,
        } => info!(
            source = %source.display(),
            destination = %destination.display(),
            bytes,
            "Transferred file"
        ),
        TransferOutcome::Skipped { source, reason, .. } => {
            debug!(source = %source.display(), reason = reason.as_str(), "Skipped file")
        }
        TransferOutcome::Failed {
            source,
            kind,
            message,
            ..
        } => error!(
            source = %source.display(),
            kind = %kind,
            error = %message,
            "Failed to transfer file"
        ),
    }
}
