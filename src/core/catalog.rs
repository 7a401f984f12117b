//! Enumeration of the files on the device.
//!
//! The catalog is a lazy, single-pass walk. Entries are visited in file-name
//! order within each directory so a run sees a stable sequence. Symlinks are
//! never followed and only regular files are yielded; anything that cannot be
//! read is reported as [`CatalogEntry::Unreadable`] and the walk continues.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::models::{SourceFile, is_partial_name};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    File(SourceFile),
    Unreadable {
        path: PathBuf,
        kind: io::ErrorKind,
        message: String,
    },
}

/// Iterator over the regular files below a root.
pub struct FileCatalog {
    root: PathBuf,
    walker: walkdir::IntoIter,
}

/// Start enumerating `root`. Nothing touches the filesystem until the first
/// call to `next()`.
pub fn enumerate(root: &Path) -> FileCatalog {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    FileCatalog {
        root: root.to_path_buf(),
        walker,
    }
}

impl FileCatalog {
    fn entry_from(&self, entry: walkdir::DirEntry) -> Option<CatalogEntry> {
        // Symlinks report their own type since links are not followed
        if !entry.file_type().is_file() {
            return None;
        }

        if is_partial_name(entry.file_name()) {
            debug!(path = %entry.path().display(), "Ignoring partial transfer file");
            return None;
        }

        let path = entry.path().to_path_buf();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => return Some(unreadable(path, &e)),
        };

        let relative_path = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(entry.file_name()));

        Some(CatalogEntry::File(SourceFile {
            path,
            relative_path,
            size: metadata.len(),
            modified: metadata.modified().ok(),
        }))
    }
}

impl Iterator for FileCatalog {
    type Item = CatalogEntry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.walker.next()? {
                Ok(entry) => {
                    if let Some(item) = self.entry_from(entry) {
                        return Some(item);
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    return Some(unreadable(path, &e));
                }
            }
        }
    }
}

fn unreadable(path: PathBuf, error: &walkdir::Error) -> CatalogEntry {
    let kind = error
        .io_error()
        .map(io::Error::kind)
        .unwrap_or(io::ErrorKind::Other);

    warn!(path = %path.display(), error = %error, "Skipping unreadable entry");

    CatalogEntry::Unreadable {
        path,
        kind,
        message: error.to_string(),
    }
}
