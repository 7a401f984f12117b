use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Label used for files whose modification time cannot be read.
pub const UNKNOWN_BUCKET: &str = "unknown";

/// Format of a dated bucket directory (`MM-DD-YYYY`).
const BUCKET_FORMAT: &str = "%m-%d-%Y";

/// Suffix of the hidden file a transfer writes before renaming into place.
pub const PARTIAL_SUFFIX: &str = ".camsync-partial";

/// Hidden temporary name for `file_name` while it is being written.
pub fn partial_name(file_name: &OsStr) -> OsString {
    let mut name = OsString::from(".");
    name.push(file_name);
    name.push(PARTIAL_SUFFIX);
    name
}

pub fn is_partial_name(file_name: &OsStr) -> bool {
    let name = file_name.to_string_lossy();
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Leave the source untouched after a verified copy
    #[default]
    Copy,
    /// Delete the source once the destination copy is verified
    Move,
}

impl TransferMode {
    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Copy => "copied",
            Self::Move => "moved",
        }
    }
}

/// A resolved mount for the camera at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub path: PathBuf,
    pub source: String,
    pub fstype: String,
}

/// A regular file found on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl SourceFile {
    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }
}

/// Destination subdirectory derived from a file's modification date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateBucket(String);

impl DateBucket {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(BUCKET_FORMAT).to_string())
    }

    /// Bucket for a modification time, in local time. A missing time, or one
    /// outside the representable calendar range, maps to `unknown`.
    pub fn from_modified(modified: Option<SystemTime>) -> Self {
        modified
            .and_then(local_date)
            .map(Self::from_date)
            .unwrap_or_else(Self::unknown)
    }

    pub fn unknown() -> Self {
        Self(UNKNOWN_BUCKET.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == UNKNOWN_BUCKET
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn dir(&self, destination_root: &Path) -> PathBuf {
        destination_root.join(&self.0)
    }
}

fn local_date(ts: SystemTime) -> Option<NaiveDate> {
    let utc = match ts.duration_since(UNIX_EPOCH) {
        Ok(after) => {
            let secs = i64::try_from(after.as_secs()).ok()?;
            DateTime::<Utc>::from_timestamp(secs, after.subsec_nanos())
        }
        Err(e) => {
            let before = e.duration();
            let secs = i64::try_from(before.as_secs()).ok()?;
            match before.subsec_nanos() {
                0 => DateTime::<Utc>::from_timestamp(-secs, 0),
                nanos => DateTime::<Utc>::from_timestamp(-secs - 1, 1_000_000_000 - nanos),
            }
        }
    }?;
    Some(utc.with_timezone(&Local).date_naive())
}

impl fmt::Display for DateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file scheduled for transfer with its precomputed destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub source: SourceFile,
    pub bucket: DateBucket,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The destination already holds a file with this name in this bucket
    AlreadyExists,
    /// Another source file with the same name was planned into the same bucket
    DuplicateInRun,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyExists => "already exists",
            Self::DuplicateInRun => "duplicate name in this run",
        }
    }
}

/// Why a single transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    NotFound,
    PermissionDenied,
    NoSpace,
    DeviceGone,
    SizeMismatch,
    SourceNotRemoved,
    Cancelled,
    Io,
}

impl TransferErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::NoSpace => "no space left",
            Self::DeviceGone => "device removed",
            Self::SizeMismatch => "size mismatch",
            Self::SourceNotRemoved => "source not removed",
            Self::Cancelled => "cancelled",
            Self::Io => "i/o error",
        }
    }
}

impl fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Succeeded {
        source: PathBuf,
        destination: PathBuf,
        bytes: u64,
    },
    Skipped {
        source: PathBuf,
        destination: PathBuf,
        reason: SkipReason,
    },
    Failed {
        source: PathBuf,
        destination: PathBuf,
        kind: TransferErrorKind,
        message: String,
    },
}

impl TransferOutcome {
    pub fn source(&self) -> &Path {
        match self {
            Self::Succeeded { source, .. }
            | Self::Skipped { source, .. }
            | Self::Failed { source, .. } => source,
        }
    }
}

/// Aggregate counts for one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub succeeded: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Catalog entries that could not be read
    pub unreadable: u64,
    pub bytes: u64,
}

impl TransferSummary {
    pub fn record(&mut self, outcome: &TransferOutcome) {
        match outcome {
            TransferOutcome::Succeeded { bytes, .. } => {
                self.succeeded += 1;
                self.bytes += bytes;
            }
            TransferOutcome::Skipped { .. } => self.skipped += 1,
            TransferOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Files that were new for this run (attempted, whatever the result).
    pub fn attempted(&self) -> u64 {
        self.succeeded + self.failed
    }

    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Outcomes of every task in plan order plus their aggregate.
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    pub outcomes: Vec<TransferOutcome>,
    pub summary: TransferSummary,
}

impl TransferReport {
    pub fn push(&mut self, outcome: TransferOutcome) {
        self.summary.record(&outcome);
        self.outcomes.push(outcome);
    }
}
