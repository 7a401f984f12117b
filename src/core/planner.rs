use std::path::PathBuf;

use tracing::{debug, info};

use super::catalog::CatalogEntry;
use super::index::DestinationIndex;
use super::models::{DateBucket, SkipReason, SourceFile, TransferOutcome, TransferTask};

/// What one reconciliation cycle will do, computed before any write.
#[derive(Debug, Default)]
pub struct TransferPlan {
    pub tasks: Vec<TransferTask>,
    /// Files left alone, as outcomes so they flow into the run summary
    pub skipped: Vec<TransferOutcome>,
    /// Catalog entries that could not be read
    pub unreadable: Vec<PathBuf>,
}

impl TransferPlan {
    pub fn total_files(&self) -> usize {
        self.tasks.len() + self.skipped.len()
    }
}

/// Destination for `file` under `destination_root`: `root/MM-DD-YYYY/name`.
pub fn task_for(file: SourceFile, destination_root: &std::path::Path) -> TransferTask {
    let bucket = DateBucket::from_modified(file.modified);
    let destination = bucket.dir(destination_root).join(file.file_name());
    TransferTask {
        source: file,
        bucket,
        destination,
    }
}

/// Turn catalog entries into an ordered plan, dropping files the archive
/// already holds. Order follows the catalog.
pub fn plan<I>(entries: I, index: &mut DestinationIndex) -> TransferPlan
where
    I: IntoIterator<Item = CatalogEntry>,
{
    let mut plan = TransferPlan::default();
    let root = index.root().to_path_buf();

    for entry in entries {
        let file = match entry {
            CatalogEntry::File(file) => file,
            CatalogEntry::Unreadable { path, .. } => {
                plan.unreadable.push(path);
                continue;
            }
        };

        let task = task_for(file, &root);
        let name = task.source.file_name().to_os_string();

        if task.bucket.is_unknown() {
            debug!(
                file = %task.source.path.display(),
                "No usable modification time, using unknown bucket"
            );
        }

        let reason = if index.exists(&task.bucket, &name) {
            Some(SkipReason::AlreadyExists)
        } else if !index.claim(&task.bucket, &name) {
            Some(SkipReason::DuplicateInRun)
        } else {
            None
        };

        match reason {
            Some(reason) => {
                debug!(
                    file = %task.source.relative_path.display(),
                    bucket = %task.bucket,
                    reason = reason.as_str(),
                    "Skipping file"
                );
                plan.skipped.push(TransferOutcome::Skipped {
                    source: task.source.path,
                    destination: task.destination,
                    reason,
                });
            }
            None => {
                debug!(
                    file = %task.source.relative_path.display(),
                    destination = %task.destination.display(),
                    "Planned transfer"
                );
                plan.tasks.push(task);
            }
        }
    }

    info!(
        total_files = plan.total_files(),
        new_files = plan.tasks.len(),
        skipped = plan.skipped.len(),
        unreadable = plan.unreadable.len(),
        "Transfer plan ready"
    );

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use std::fs;
    use std::io;
    use std::path::Path;
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn local(y: i32, m: u32, d: u32) -> SystemTime {
        Local.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap().into()
    }

    fn file(path: &str, modified: Option<SystemTime>) -> CatalogEntry {
        CatalogEntry::File(SourceFile {
            path: PathBuf::from("/media/cam/DCIM").join(path),
            relative_path: PathBuf::from(path),
            size: 1,
            modified,
        })
    }

    #[test]
    fn test_plan_assigns_date_buckets() {
        let temp = tempdir().unwrap();
        let mut index = DestinationIndex::new(temp.path());

        let plan = plan(
            vec![
                file("100GOPRO/A.MP4", Some(local(2024, 1, 1))),
                file("100GOPRO/B.MP4", Some(local(2024, 1, 2))),
            ],
            &mut index,
        );

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].destination, temp.path().join("01-01-2024/A.MP4"));
        assert_eq!(plan.tasks[1].destination, temp.path().join("01-02-2024/B.MP4"));
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let entries = || {
            vec![
                file("100GOPRO/A.MP4", Some(local(2024, 3, 5))),
                file("100GOPRO/B.JPG", None),
            ]
        };
        let root = Path::new("/nonexistent/archive");

        let first = plan(entries(), &mut DestinationIndex::new(root));
        let second = plan(entries(), &mut DestinationIndex::new(root));

        assert_eq!(first.tasks, second.tasks);
        assert_eq!(first.tasks[1].destination, root.join("unknown/B.JPG"));
    }

    #[test]
    fn test_plan_skips_existing_destination() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("01-01-2024")).unwrap();
        fs::write(temp.path().join("01-01-2024/A.MP4"), b"a").unwrap();

        let mut index = DestinationIndex::new(temp.path());
        let plan = plan(
            vec![
                file("100GOPRO/A.MP4", Some(local(2024, 1, 1))),
                file("100GOPRO/B.MP4", Some(local(2024, 1, 1))),
            ],
            &mut index,
        );

        assert_eq!(plan.tasks.len(), 1);
        assert_eq!(plan.tasks[0].source.relative_path, PathBuf::from("100GOPRO/B.MP4"));
        assert!(matches!(
            plan.skipped[0],
            TransferOutcome::Skipped {
                reason: SkipReason::AlreadyExists,
                ..
            }
        ));
    }

    #[test]
    fn test_plan_skips_same_name_twice_in_bucket() {
        let temp = tempdir().unwrap();
        let mut index = DestinationIndex::new(temp.path());

        let plan = plan(
            vec![
                file("100GOPRO/GOPR0001.JPG", Some(local(2024, 1, 1))),
                file("101GOPRO/GOPR0001.JPG", Some(local(2024, 1, 1))),
                file("102GOPRO/GOPR0001.JPG", Some(local(2024, 1, 2))),
            ],
            &mut index,
        );

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.skipped.len(), 1);
        assert!(matches!(
            plan.skipped[0],
            TransferOutcome::Skipped {
                reason: SkipReason::DuplicateInRun,
                ..
            }
        ));
    }

    #[test]
    fn test_plan_collects_unreadable_entries() {
        let temp = tempdir().unwrap();
        let mut index = DestinationIndex::new(temp.path());

        let plan = plan(
            vec![
                CatalogEntry::Unreadable {
                    path: PathBuf::from("/media/cam/DCIM/locked"),
                    kind: io::ErrorKind::PermissionDenied,
                    message: "permission denied".to_string(),
                },
                file("100GOPRO/A.MP4", Some(local(2024, 1, 1))),
            ],
            &mut index,
        );

        assert_eq!(plan.unreadable, vec![PathBuf::from("/media/cam/DCIM/locked")]);
        assert_eq!(plan.tasks.len(), 1);
    }
}
