#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use camsync::adapters::{SimulatedResolver, Simulator};
use camsync::config::{AppConfig, NotificationConfig, SoundConfig};
use camsync::context::AppContext;
use camsync::core::Orchestrator;
use chrono::{Local, TimeZone};
use filetime::{FileTime, set_file_mtime};
use tempfile::TempDir;

/// A fake camera card with a `DCIM/100GOPRO` directory.
pub struct Camera {
    pub dir: TempDir,
}

impl Camera {
    pub fn new() -> Self {
        Self::with_dir(tempfile::tempdir().unwrap())
    }

    /// A card on the filesystem at `parent` (tmpfs keeps extreme timestamps).
    pub fn new_in(parent: &Path) -> Self {
        Self::with_dir(tempfile::tempdir_in(parent).unwrap())
    }

    fn with_dir(dir: TempDir) -> Self {
        fs::create_dir_all(dir.path().join("DCIM").join("100GOPRO")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `DCIM/100GOPRO/<name>` modified at noon local time on the given day.
    pub fn add(&self, name: &str, contents: &[u8], (year, month, day): (i32, u32, u32)) -> PathBuf {
        let path = self.root().join("DCIM").join("100GOPRO").join(name);
        fs::write(&path, contents).unwrap();
        set_mtime(&path, year, month, day);
        path
    }
}

pub fn set_mtime(path: &Path, year: i32, month: u32, day: u32) {
    let ts = Local.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap();
    set_file_mtime(path, FileTime::from_unix_time(ts.timestamp(), 0)).unwrap();
}

/// Quiet config: no notifications, no sound, short polling.
pub fn test_config(destination: &Path) -> AppConfig {
    AppConfig {
        destination_directory: destination.to_path_buf(),
        poll_interval_ms: 10,
        max_wait_ms: 300,
        resolve_timeout_ms: 500,
        sync_files: false,
        notifications: NotificationConfig {
            enabled: false,
            ..Default::default()
        },
        sound: SoundConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Orchestrator over a simulated resolver that is already attached to `mount`.
pub fn attached_orchestrator(config: AppConfig, mount: &Path) -> (Orchestrator, Simulator) {
    let (resolver, simulator) = SimulatedResolver::new();
    simulator.attach(mount);
    let orchestrator = Orchestrator::new(AppContext::new(config), Arc::new(resolver));
    (orchestrator, simulator)
}

/// Every file below `root`, relative and sorted, hidden files included.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    files.sort();
    files
}
