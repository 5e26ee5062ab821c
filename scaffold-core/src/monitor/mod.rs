//! Filesystem monitoring and change detection
//!
//! This module provides polling-based change detection with:
//! - Monitoring requests for single files, directories and directory subtrees
//! - Snapshot diffing into created/updated/deleted events
//! - A hint fast path fed by the file manager or native watchers
//! - Ant-style path searches

pub mod driver;
pub mod hints;
pub mod polling;
pub mod request;


pub use driver::{DriverStats, MonitorDriver};
pub use hints::NotifyHintSource;
pub use polling::PollingFileMonitorService;
pub use request::{MonitoringRequest, RequestKind};

use chrono::{DateTime, Utc};
use path_patterns::PatternError;
use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Expected a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Expected a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("A monitoring request needs at least one operation to notify on")]
    NoOperations,

    #[error("Subtree watching only applies to directories: {}", .0.display())]
    SubtreeOnFile(PathBuf),

    #[error("Invalid monitoring request encoding: {0}")]
    InvalidEncoding(String),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("Native watcher error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Kinds of change a monitor can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileOperation {
    Created,
    Updated,
    Deleted,
    /// Part of the request vocabulary only; renames surface as `Deleted` + `Created`.
    Renamed,
    MonitoringStart,
    MonitoringFinish,
}

impl FileOperation {
    /// Operations a request can subscribe to, in encoding order
    pub const SUBSCRIBABLE: [FileOperation; 4] =
        [FileOperation::Created, FileOperation::Renamed, FileOperation::Updated, FileOperation::Deleted];

    pub fn opcode(self) -> Option<char> {
        match self {
            FileOperation::Created => Some('C'),
            FileOperation::Renamed => Some('R'),
            FileOperation::Updated => Some('U'),
            FileOperation::Deleted => Some('D'),
            FileOperation::MonitoringStart | FileOperation::MonitoringFinish => None,
        }
    }

    pub fn from_opcode(code: char) -> Option<Self> {
        Self::SUBSCRIBABLE.into_iter().find(|op| op.opcode() == Some(code))
    }

    /// Start/finish events bracket a request's lifetime and are never filtered out
    pub fn is_lifecycle(self) -> bool {
        matches!(self, FileOperation::MonitoringStart | FileOperation::MonitoringFinish)
    }
}

/// A path and the last-modified time it had when it was observed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileDetails {
    pub path: PathBuf,
    /// Milliseconds since the Unix epoch
    pub last_modified: Option<u64>,
}

impl FileDetails {
    pub fn new(path: impl Into<PathBuf>, last_modified: u64) -> Self {
        Self { path: path.into(), last_modified: Some(last_modified) }
    }

    /// Details for a path whose timestamp is unknown
    pub fn without_timestamp(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), last_modified: None }
    }

    pub fn modified_at(&self) -> Option<DateTime<Utc>> {
        let millis = i64::try_from(self.last_modified?).ok()?;
        DateTime::from_timestamp_millis(millis)
    }
}

/// A change reported to listeners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEvent {
    pub details: FileDetails,
    pub operation: FileOperation,
    /// The previous snapshot entry, for updates
    pub prior: Option<FileDetails>,
}

impl FileEvent {
    pub fn new(details: FileDetails, operation: FileOperation) -> Self {
        Self { details, operation, prior: None }
    }

    pub fn with_prior(mut self, prior: FileDetails) -> Self {
        self.prior = Some(prior);
        self
    }
}

/// Receives events published by a monitor.
///
/// Listeners run after a pass has released the monitor's lock, so they may call
/// back into it, for example to record hints for files they regenerate.
pub trait FileEventListener: Send + Sync {
    fn on_file_event(&self, event: &FileEvent);
}

impl<F> FileEventListener for F
where
    F: Fn(&FileEvent) + Send + Sync,
{
    fn on_file_event(&self, event: &FileEvent) {
        self(event)
    }
}

/// Configuration for the monitoring system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Delay between polling passes
    pub poll_interval_ms: u64,
    /// Every Nth pass is a full `scan_all`; the others only drain hints
    pub full_scan_every: u32,
    /// Requests in `<path>,<opcodes>[,**]` form
    pub requests: Vec<String>,
    /// Feed hints from the platform's native watcher
    pub native_hints: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            full_scan_every: 5,
            requests: vec![".,CUD,**".to_string()],
            native_hints: false,
        }
    }
}

/// Last-modified time of `metadata` in milliseconds since the Unix epoch
pub(crate) fn modified_millis(metadata: &Metadata) -> std::io::Result<u64> {
    let modified = metadata.modified()?;
    let millis = modified.duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0);
    Ok(u64::try_from(millis).unwrap_or(u64::MAX))
}

/// Dot-prefixed names longer than one character are never tracked
pub(crate) fn is_hidden_name(name: &std::ffi::OsStr) -> bool {
    let name = name.to_string_lossy();
    name.chars().count() > 1 && name.starts_with('.')
}
