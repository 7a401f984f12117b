//! Poll loop behaviour with the simulated resolver.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use camsync::adapters::SimulatedResolver;
use camsync::context::AppContext;
use camsync::core::{
    DeviceHint, MountCandidate, MountPoint, MountResolver, Orchestrator, SyncError,
};
use camsync::runtime;
use common::{Camera, list_files, test_config};
use tempfile::tempdir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Blocks for `hang` on the first `hangs` lookups, then reports `mount`.
struct SlowResolver {
    hang: Duration,
    hangs: usize,
    mount: Option<PathBuf>,
    calls: AtomicUsize,
}

impl SlowResolver {
    fn new(hang: Duration, hangs: usize, mount: Option<PathBuf>) -> Self {
        Self {
            hang,
            hangs,
            mount,
            calls: AtomicUsize::new(0),
        }
    }
}

impl MountResolver for SlowResolver {
    fn resolve(&self, _hint: &DeviceHint) -> anyhow::Result<Option<MountPoint>> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.hangs {
            std::thread::sleep(self.hang);
        }
        Ok(self.mount.clone().map(|path| MountPoint {
            path,
            source: "slow".to_string(),
            fstype: "test".to_string(),
        }))
    }

    fn candidates(&self, _hint: &DeviceHint) -> anyhow::Result<Vec<MountCandidate>> {
        Ok(Vec::new())
    }
}

/// Every lookup fails.
struct BrokenResolver;

impl MountResolver for BrokenResolver {
    fn resolve(&self, _hint: &DeviceHint) -> anyhow::Result<Option<MountPoint>> {
        anyhow::bail!("mount table unreadable")
    }

    fn candidates(&self, _hint: &DeviceHint) -> anyhow::Result<Vec<MountCandidate>> {
        anyhow::bail!("mount table unreadable")
    }
}

#[tokio::test]
async fn test_waits_until_device_is_attached() {
    let camera = Camera::new();
    camera.add("A.MP4", b"clip", (2024, 1, 1));
    let archive = tempdir().unwrap();

    let mut config = test_config(archive.path());
    config.max_wait_ms = 5_000;

    let (resolver, simulator) = SimulatedResolver::new();
    let orchestrator = Orchestrator::new(AppContext::new(config), Arc::new(resolver));

    let mount = camera.root().to_path_buf();
    let attacher = simulator.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        attacher.attach(mount);
    });

    let run = timeout(Duration::from_secs(5), orchestrator.run(CancellationToken::new()))
        .await
        .expect("run did not finish")
        .unwrap();

    assert!(simulator.resolve_count() >= 2);
    assert_eq!(run.mount.path, camera.root());
    assert_eq!(run.report.summary.succeeded, 1);
}

#[tokio::test]
async fn test_no_device_gives_up_without_writing() {
    let scratch = tempdir().unwrap();
    let archive = scratch.path().join("archive");

    let (resolver, simulator) = SimulatedResolver::new();
    let orchestrator = Orchestrator::new(AppContext::new(test_config(&archive)), Arc::new(resolver));

    let started = Instant::now();
    let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();

    match &err {
        SyncError::DeviceNotFound { waited } => assert!(*waited >= Duration::from_millis(300)),
        other => panic!("expected DeviceNotFound, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 2);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(simulator.resolve_count() > 1);
    assert!(!archive.exists());
    assert!(list_files(scratch.path()).is_empty());
}

#[tokio::test]
async fn test_cancel_while_waiting() {
    let archive = tempdir().unwrap();
    let mut config = test_config(archive.path());
    config.max_wait_ms = 60_000;

    let (resolver, _simulator) = SimulatedResolver::new();
    let orchestrator = Orchestrator::new(AppContext::new(config), Arc::new(resolver));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = timeout(Duration::from_secs(5), orchestrator.run(cancel))
        .await
        .expect("cancellation was not observed")
        .unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert_eq!(err.exit_code(), 130);
}

#[tokio::test]
async fn test_cancelled_token_stops_before_polling() {
    let camera = Camera::new();
    camera.add("A.MP4", b"clip", (2024, 1, 1));
    let archive = tempdir().unwrap();

    let (orchestrator, _sim) =
        common::attached_orchestrator(test_config(archive.path()), camera.root());

    let cancel = CancellationToken::new();
    let mount = orchestrator.wait_for_mount(&cancel).await.unwrap();
    assert_eq!(mount.path, camera.root());

    // a cancelled token stops the run before anything is written
    cancel.cancel();
    let err = orchestrator.run(cancel).await.unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert!(list_files(archive.path()).is_empty());
}

#[tokio::test]
async fn test_timed_out_lookup_counts_as_absent() {
    let camera = Camera::new();
    camera.add("A.MP4", b"clip", (2024, 1, 1));
    let archive = tempdir().unwrap();

    let mut config = test_config(archive.path());
    config.resolve_timeout_ms = 100;
    config.max_wait_ms = 5_000;

    let resolver = Arc::new(SlowResolver::new(
        Duration::from_millis(800),
        1,
        Some(camera.root().to_path_buf()),
    ));
    let orchestrator = Orchestrator::new(AppContext::new(config), resolver.clone());

    let started = Instant::now();
    let run = orchestrator.run(CancellationToken::new()).await.unwrap();

    // the hung first lookup was abandoned, not waited out
    assert!(started.elapsed() < Duration::from_millis(800));
    assert!(resolver.calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(run.mount.path, camera.root());
    assert_eq!(run.report.summary.succeeded, 1);
}

#[tokio::test]
async fn test_lookup_error_on_last_attempt_is_a_resolver_error() {
    let archive = tempdir().unwrap();
    let orchestrator = Orchestrator::new(
        AppContext::new(test_config(archive.path())),
        Arc::new(BrokenResolver),
    );

    let err = orchestrator.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, SyncError::Resolver(_)));
    assert!(err.to_string().contains("mount table unreadable"));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn test_shutdown_abandons_wedged_lookup() {
    let scratch = tempdir().unwrap();
    let mut config = test_config(&scratch.path().join("archive"));
    config.resolve_timeout_ms = 100;
    config.max_wait_ms = 300;

    let resolver = Arc::new(SlowResolver::new(Duration::from_secs(5), usize::MAX, None));
    let orchestrator = Orchestrator::new(AppContext::new(config), resolver);

    let started = Instant::now();
    let result = runtime::block_on(
        async move { orchestrator.run(CancellationToken::new()).await },
        Duration::from_millis(200),
    )
    .unwrap();

    assert!(matches!(result, Err(SyncError::DeviceNotFound { .. })));
    assert!(started.elapsed() < Duration::from_secs(3));
}
