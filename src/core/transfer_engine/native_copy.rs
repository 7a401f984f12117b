use crate::core::ownership::FileOwner;
use crate::core::transfer_engine::{CopyError, TransferEngine};
use anyhow::{Result, anyhow};
use nix::unistd::{Gid, Group, Uid, User, chown};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Buffer size for file I/O operations (128KB for optimal throughput)
const BUFFER_SIZE: usize = 128 * 1024;

/// Native file copy engine.
///
/// - Large buffered I/O
/// - Metadata preservation (permissions, timestamps)
/// - Optional ownership transfer
/// - Optional per-file fsync for durability
pub struct NativeCopyEngine {
    /// Whether to fsync each file after writing (safer but slower)
    pub sync_files: bool,
    owner_ids: Option<OwnerIds>,
}

impl Default for NativeCopyEngine {
    fn default() -> Self {
        Self {
            sync_files: true,
            owner_ids: None,
        }
    }
}

/// Resolved owner UID and GID
#[derive(Debug, Clone)]
struct OwnerIds {
    uid: Uid,
    gid: Gid,
}

impl NativeCopyEngine {
    pub fn new(sync_files: bool) -> Self {
        Self {
            sync_files,
            owner_ids: None,
        }
    }

    /// Hand copied files and created directories to `owner`.
    pub fn with_owner(mut self, owner: Option<&FileOwner>) -> Self {
        self.owner_ids = owner.and_then(|o| match resolve_owner(o) {
            Ok(ids) => Some(ids),
            Err(e) => {
                warn!(error = %e, "Failed to resolve owner, files will be owned by process user");
                None
            }
        });
        self
    }

    fn apply_owner(&self, path: &Path) {
        if let Some(ids) = &self.owner_ids {
            if let Err(e) = chown(path, Some(ids.uid), Some(ids.gid)) {
                debug!(
                    path = %path.display(),
                    error = %e,
                    "Failed to set ownership"
                );
            }
        }
    }
}

impl TransferEngine for NativeCopyEngine {
    fn copy_file(&self, source: &Path, dest: &Path) -> Result<u64, CopyError> {
        let bytes = copy_single_file(source, dest, self.sync_files)?;
        self.apply_owner(dest);
        Ok(bytes)
    }

    fn prepare_dir(&self, dir: &Path) -> io::Result<()> {
        if dir.is_dir() {
            return Ok(());
        }
        fs::create_dir_all(dir)?;
        self.apply_owner(dir);
        Ok(())
    }
}

/// Resolve a FileOwner to UID/GID
fn resolve_owner(owner: &FileOwner) -> Result<OwnerIds> {
    let user = User::from_name(&owner.user)
        .map_err(|e| anyhow!("Failed to lookup user '{}': {}", owner.user, e))?
        .ok_or_else(|| anyhow!("User '{}' not found", owner.user))?;

    let group = Group::from_name(&owner.group)
        .map_err(|e| anyhow!("Failed to lookup group '{}': {}", owner.group, e))?
        .ok_or_else(|| anyhow!("Group '{}' not found", owner.group))?;

    Ok(OwnerIds {
        uid: user.uid,
        gid: group.gid,
    })
}

/// Copy a single file with metadata preservation
fn copy_single_file(source: &Path, dest: &Path, sync_file: bool) -> Result<u64, CopyError> {
    // Read source file metadata first
    let source_metadata =
        fs::metadata(source).map_err(|e| CopyError::io("Failed to read source metadata", &e))?;

    let source_file =
        File::open(source).map_err(|e| CopyError::io("Failed to open source file", &e))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);

    // Truncate whatever an interrupted run left behind under this name
    let dest_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(dest)
        .map_err(|e| CopyError::io("Failed to create destination file", &e))?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);

    // Copy data in chunks
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| CopyError::io("Failed to read from source", &e))?;

        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| CopyError::io("Failed to write to destination", &e))?;

        bytes_written += bytes_read as u64;
    }

    writer
        .flush()
        .map_err(|e| CopyError::io("Failed to flush destination file", &e))?;

    if sync_file {
        let inner = writer
            .into_inner()
            .map_err(|e| CopyError::io("Failed to get inner file handle", e.error()))?;

        inner
            .sync_all()
            .map_err(|e| CopyError::io("Failed to sync file", &e))?;
    }

    // Preserve permissions
    if let Err(e) = fs::set_permissions(dest, source_metadata.permissions()) {
        // Log but don't fail - permission errors happen on exfat/vfat destinations
        debug!(
            dest = %dest.display(),
            error = %e,
            "Failed to set file permissions"
        );
    }

    // Preserve timestamps so the archive keeps the capture date
    if let Err(e) = preserve_timestamps(&source_metadata, dest) {
        debug!(
            dest = %dest.display(),
            error = %e,
            "Failed to preserve file timestamps"
        );
    }

    Ok(bytes_written)
}

/// Copy access and modification timestamps onto `dest`
fn preserve_timestamps(source_metadata: &fs::Metadata, dest: &Path) -> io::Result<()> {
    let atime = filetime::FileTime::from_last_access_time(source_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(source_metadata);

    filetime::set_file_times(dest, atime, mtime)
}
