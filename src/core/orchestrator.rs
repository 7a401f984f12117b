use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::context::AppContext;
use crate::core::catalog;
use crate::core::error::SyncError;
use crate::core::executor::TransferExecutor;
use crate::core::hardware::MountResolver;
use crate::core::index::DestinationIndex;
use crate::core::models::{MountPoint, TransferMode, TransferReport};
use crate::core::notifications::{RunEvent, notify_best_effort};
use crate::core::ownership::get_archive_owner;
use crate::core::planner;
use crate::core::transfer_engine::{NativeCopyEngine, TransferEngine};

/// Result of one completed run.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub mount: MountPoint,
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub report: TransferReport,
    /// Verdict of the configured notify policy
    pub success: bool,
    /// The run was interrupted part way through the transfers
    pub cancelled: bool,
}

impl RunReport {
    /// `copied 2 / skipped 0 / failed 0 (3.00 MB) -> /archive`
    pub fn summary_line(&self) -> String {
        let s = &self.report.summary;
        format!(
            "{} {} / skipped {} / failed {} ({:.2} MB) -> {}",
            self.mode.past_tense(),
            s.succeeded,
            s.skipped,
            s.failed,
            s.megabytes(),
            self.destination.display()
        )
    }

    pub fn exit_code(&self) -> u8 {
        if self.cancelled {
            130
        } else if self.report.summary.failed > 0 {
            3
        } else {
            0
        }
    }
}

/// Waits for the camera, then runs a single reconciliation cycle.
pub struct Orchestrator {
    ctx: AppContext,
    resolver: Arc<dyn MountResolver>,
    engine: Option<Arc<dyn TransferEngine>>,
}

impl Orchestrator {
    pub fn new(ctx: AppContext, resolver: Arc<dyn MountResolver>) -> Self {
        Self {
            ctx,
            resolver,
            engine: None,
        }
    }

    /// Replace the native copy engine.
    pub fn with_engine(mut self, engine: Arc<dyn TransferEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub async fn run(&self, cancel: CancellationToken) -> Result<RunReport, SyncError> {
        let run_id = Uuid::now_v7().to_string();
        let span = info_span!("reconcile", run_id = %run_id);
        self.run_once(run_id, cancel).instrument(span).await
    }

    /// Poll the resolver until the device shows up, the wait budget runs
    /// out, or `cancel` fires. Never touches the destination.
    pub async fn wait_for_mount(
        &self,
        cancel: &CancellationToken,
    ) -> Result<MountPoint, SyncError> {
        let config = &self.ctx.config;
        let poll_interval = Duration::from_millis(config.poll_interval_ms);
        let max_wait = Duration::from_millis(config.max_wait_ms);
        let resolve_timeout = Duration::from_millis(config.resolve_timeout_ms);

        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            attempts += 1;

            let resolver = Arc::clone(&self.resolver);
            let hint = config.device.clone();
            let lookup = tokio::task::spawn_blocking(move || resolver.resolve(&hint));

            let last_error = match tokio::time::timeout(resolve_timeout, lookup).await {
                Ok(Ok(Ok(Some(mount)))) => {
                    debug!(attempts, "Mount resolved");
                    return Ok(mount);
                }
                Ok(Ok(Ok(None))) => {
                    debug!(attempts, "Device not mounted yet");
                    None
                }
                Ok(Ok(Err(e))) => {
                    warn!(attempts, error = %e, "Mount lookup failed");
                    Some(e)
                }
                Ok(Err(join)) => return Err(SyncError::Worker(join)),
                Err(_) => {
                    warn!(
                        attempts,
                        timeout_ms = config.resolve_timeout_ms,
                        "Mount lookup timed out"
                    );
                    None
                }
            };

            let waited = start.elapsed();
            if waited >= max_wait {
                return Err(match last_error {
                    Some(e) => SyncError::Resolver(e),
                    None => SyncError::DeviceNotFound { waited },
                });
            }

            let pause = poll_interval.min(max_wait - waited);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            }
        }
    }

    async fn run_once(
        &self,
        run_id: String,
        cancel: CancellationToken,
    ) -> Result<RunReport, SyncError> {
        let config = Arc::clone(&self.ctx.config);

        info!(
            labels = ?config.device.labels,
            max_wait_ms = config.max_wait_ms,
            "Waiting for device"
        );
        let mount = self.wait_for_mount(&cancel).await?;
        info!(
            mount = %mount.path.display(),
            source = %mount.source,
            fstype = %mount.fstype,
            "Device resolved"
        );

        let report = match self.reconcile(&mount, &cancel).await {
            Ok(report) => report,
            Err(e) => {
                if matches!(e, SyncError::DestinationUnwritable { .. }) {
                    self.notify(RunEvent::Failed {
                        run_id,
                        device: mount.path.clone(),
                        error: e.to_string(),
                    })
                    .await;
                }
                return Err(e);
            }
        };

        let success = config.notifications.policy.is_success(&report.summary);
        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!("Run cancelled, remaining files left for the next run");
        }

        self.notify(RunEvent::Completed {
            run_id: run_id.clone(),
            device: mount.path.clone(),
            destination: config.destination_directory.clone(),
            mode: config.mode,
            success,
            summary: report.summary,
        })
        .await;

        if success && !cancelled {
            if let Some(sound) = &self.ctx.sound {
                sound.play_best_effort().await;
            }
        }

        Ok(RunReport {
            run_id,
            mount,
            destination: config.destination_directory.clone(),
            mode: config.mode,
            report,
            success,
            cancelled,
        })
    }

    /// Catalog, plan and execute on a blocking thread.
    async fn reconcile(
        &self,
        mount: &MountPoint,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, SyncError> {
        let config = Arc::clone(&self.ctx.config);
        let source_root = source_root(&mount.path, &config.source_subdir);
        let engine = self.engine.clone();
        let cancel = cancel.clone();
        let span = tracing::Span::current();

        tokio::task::spawn_blocking(move || {
            let _guard = span.enter();
            let destination = &config.destination_directory;

            let engine: Arc<dyn TransferEngine> = match engine {
                Some(engine) => engine,
                None => {
                    let owner = get_archive_owner(destination);
                    Arc::new(NativeCopyEngine::new(config.sync_files).with_owner(owner.as_ref()))
                }
            };
            let executor = TransferExecutor::new(engine, config.mode).with_cancellation(cancel);

            info!(source = %source_root.display(), "Scanning device");
            let mut index = DestinationIndex::new(destination);
            let plan = planner::plan(catalog::enumerate(&source_root), &mut index);

            executor.execute(destination, plan)
        })
        .await?
    }

    async fn notify(&self, event: RunEvent) {
        if let Some(channel) = &self.ctx.notifier {
            let timeout = Duration::from_millis(self.ctx.config.notifications.timeout_ms);
            notify_best_effort(channel.as_ref(), event, timeout).await;
        }
    }
}

/// The media directory on the device when present, else the mount root.
pub fn source_root(mount: &Path, subdir: &str) -> PathBuf {
    if !subdir.is_empty() {
        let candidate = mount.join(subdir);
        if candidate.is_dir() {
            return candidate;
        }
    }
    mount.to_path_buf()
}
