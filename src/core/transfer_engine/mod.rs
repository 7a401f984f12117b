mod native_copy;

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use thiserror::Error;

use super::models::TransferErrorKind;

pub use native_copy::NativeCopyEngine;

/// Failure of a single file copy.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CopyError {
    pub kind: TransferErrorKind,
    pub message: String,
}

impl CopyError {
    pub fn new(kind: TransferErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap an I/O error with what we were doing when it happened.
    pub fn io(context: &str, error: &io::Error) -> Self {
        Self::new(classify_io_error(error), format!("{}: {}", context, error))
    }
}

/// Byte mover used by the executor.
///
/// The executor owns naming, verification and source removal; an engine only
/// has to put the bytes of `source` at `dest`.
pub trait TransferEngine: Send + Sync {
    /// Copy `source` to the new file `dest`, returning the number of bytes written.
    fn copy_file(&self, source: &Path, dest: &Path) -> Result<u64, CopyError>;

    /// Make sure a bucket directory exists.
    fn prepare_dir(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }
}

/// Map an I/O error onto the failure kinds reported per file.
pub fn classify_io_error(error: &io::Error) -> TransferErrorKind {
    match error.kind() {
        ErrorKind::NotFound => TransferErrorKind::NotFound,
        ErrorKind::PermissionDenied => TransferErrorKind::PermissionDenied,
        ErrorKind::BrokenPipe | ErrorKind::NotConnected => TransferErrorKind::DeviceGone,
        _ => match error.raw_os_error() {
            Some(libc::ENOSPC) | Some(libc::EDQUOT) => TransferErrorKind::NoSpace,
            Some(
                libc::EIO | libc::ENODEV | libc::ENXIO | libc::ENOMEDIUM | libc::EMEDIUMTYPE,
            ) => TransferErrorKind::DeviceGone,
            _ => TransferErrorKind::Io,
        },
    }
}
