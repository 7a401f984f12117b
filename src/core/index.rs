use std::collections::{HashMap, HashSet};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::models::DateBucket;

/// Existence checks against the destination archive.
///
/// Each bucket directory is listed once and kept for the lifetime of the
/// index, so planning many files into one day costs a single `read_dir`.
/// Names planned during the current run are tracked separately.
pub struct DestinationIndex {
    root: PathBuf,
    listings: HashMap<DateBucket, HashSet<OsString>>,
    claimed: HashSet<(DateBucket, OsString)>,
}

impl DestinationIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listings: HashMap::new(),
            claimed: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `root/bucket/file_name` is already present.
    pub fn exists(&mut self, bucket: &DateBucket, file_name: &OsStr) -> bool {
        let root = &self.root;
        self.listings
            .entry(bucket.clone())
            .or_insert_with(|| list_bucket(&bucket.dir(root)))
            .contains(file_name)
    }

    /// Record that this run will write `file_name` into `bucket`.
    /// Returns false if the name was already claimed.
    pub fn claim(&mut self, bucket: &DateBucket, file_name: &OsStr) -> bool {
        self.claimed
            .insert((bucket.clone(), file_name.to_os_string()))
    }
}

fn list_bucket(dir: &Path) -> HashSet<OsString> {
    match fs::read_dir(dir) {
        Ok(entries) => {
            let names: HashSet<OsString> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name())
                .collect();
            debug!(bucket = %dir.display(), entries = names.len(), "Listed destination bucket");
            names
        }
        Err(e) if e.kind() == ErrorKind::NotFound => HashSet::new(),
        Err(e) => {
            // Treated as empty; the executor re-checks each path before writing
            warn!(bucket = %dir.display(), error = %e, "Failed to list destination bucket");
            HashSet::new()
        }
    }
}
