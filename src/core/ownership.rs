use nix::unistd::{Gid, Group, Uid, User};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tracing::{debug, warn};

/// Represents file ownership as user:group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOwner {
    pub user: String,
    pub group: String,
}

impl std::fmt::Display for FileOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.user, self.group)
    }
}

/// Decide who should own archived files.
///
/// Only matters when running as root (udev hooks, `sudo camsync`); otherwise
/// files are created by the invoking user and nothing is changed.
///
/// Detection order:
/// 1. `SUDO_USER` environment variable - the user who invoked sudo
/// 2. Owner of the archive directory (or its closest existing ancestor)
pub fn get_archive_owner(archive_dir: &Path) -> Option<FileOwner> {
    if !Uid::effective().is_root() {
        return None;
    }

    if let Some(owner) = get_owner_from_sudo_user() {
        debug!(owner = %owner, "Detected archive owner from SUDO_USER");
        return Some(owner);
    }

    let existing = archive_dir.ancestors().find(|p| p.exists())?;
    if let Some(owner) = get_owner_from_path(existing) {
        debug!(
            owner = %owner,
            path = %existing.display(),
            "Detected archive owner from archive directory"
        );
        return Some(owner);
    }

    warn!("Could not determine archive owner - files will be owned by root");
    None
}

/// Get owner from SUDO_USER environment variable
fn get_owner_from_sudo_user() -> Option<FileOwner> {
    let sudo_user = std::env::var("SUDO_USER").ok()?;

    if sudo_user.is_empty() {
        return None;
    }

    let user = User::from_name(&sudo_user).ok()??;
    let group = Group::from_gid(user.gid).ok()??;

    Some(FileOwner {
        user: sudo_user,
        group: group.name,
    })
}

/// Get owner from the uid/gid of a filesystem path
fn get_owner_from_path(path: &Path) -> Option<FileOwner> {
    let metadata = std::fs::metadata(path).ok()?;

    let user = User::from_uid(Uid::from_raw(metadata.uid())).ok()??;
    let group = Group::from_gid(Gid::from_raw(metadata.gid())).ok()??;

    // Root-owned archive: nothing to hand over
    if user.uid.is_root() {
        return None;
    }

    Some(FileOwner {
        user: user.name,
        group: group.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_owner_display() {
        let owner = FileOwner {
            user: "joshua".to_string(),
            group: "users".to_string(),
        };
        assert_eq!(owner.to_string(), "joshua:users");
    }

    #[test]
    fn test_get_owner_from_path_nonexistent() {
        let owner = get_owner_from_path(Path::new("/nonexistent/path/that/does/not/exist"));
        assert!(owner.is_none());
    }

    #[test]
    fn test_non_root_never_changes_owner() {
        if Uid::effective().is_root() {
            return;
        }
        assert!(get_archive_owner(Path::new(".")).is_none());
    }
}
