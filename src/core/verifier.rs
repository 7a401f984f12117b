use std::fs;
use std::path::Path;

use tracing::debug;

use super::models::TransferErrorKind;
use super::transfer_engine::CopyError;

/// Check that the copy at `dest` is as long as the source.
///
/// Both sizes are read back from disk: the source length recorded by the
/// catalog may be stale, and the byte count returned by an engine says
/// nothing about what actually landed on the destination filesystem.
pub fn verify_size(source: &Path, dest: &Path) -> Result<u64, CopyError> {
    let expected = fs::metadata(source)
        .map_err(|e| CopyError::io("Failed to stat source for verification", &e))?
        .len();

    let actual = fs::metadata(dest)
        .map_err(|e| CopyError::io("Failed to stat destination for verification", &e))?
        .len();

    if expected != actual {
        return Err(CopyError::new(
            TransferErrorKind::SizeMismatch,
            format!(
                "Verification failed: destination has {} bytes, source has {}",
                actual, expected
            ),
        ));
    }

    debug!(dest = %dest.display(), bytes = actual, "Verified destination size");
    Ok(actual)
}
