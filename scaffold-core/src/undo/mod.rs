//! Transactional undo for file mutations
//!
//! Every mutation the generator performs is wrapped in an [`UndoableOperation`]
//! that captures enough state to reverse it. Operations are stacked on an
//! [`UndoManager`], which either reverses them all (`undo`) or releases their
//! backups once the run has succeeded (`reset`).

pub mod backup;
pub mod dir_ops;
pub mod file_ops;
pub mod manager;

#[cfg(test)]
mod tests;

pub use backup::Backups;
pub use dir_ops::{CreateDirectory, DeleteDirectory};
pub use file_ops::{CreateFile, DeleteFile, UpdateFile};
pub use manager::{UndoEvent, UndoListener, UndoManager};

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("Path already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Expected a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("Expected a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Could not back up {}: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, UndoError>;

impl UndoError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        UndoError::Io { path: path.to_path_buf(), source }
    }
}

/// Metadata for an existing path, mapping absence to [`UndoError::NotFound`]
pub(crate) fn existing(path: &Path) -> Result<std::fs::Metadata> {
    std::fs::metadata(path).map_err(|source| missing_or_io(path, source))
}

/// Like [`existing`], but a symlink is described as itself rather than its target
pub(crate) fn existing_entry(path: &Path) -> Result<std::fs::Metadata> {
    std::fs::symlink_metadata(path).map_err(|source| missing_or_io(path, source))
}

fn missing_or_io(path: &Path, source: std::io::Error) -> UndoError {
    match source.kind() {
        std::io::ErrorKind::NotFound => UndoError::NotFound(path.to_path_buf()),
        _ => UndoError::io(path, source),
    }
}

/// Result of reversing one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Undone,
    Failed,
}

impl UndoOutcome {
    pub fn is_undone(self) -> bool {
        self == UndoOutcome::Undone
    }
}

/// Result of releasing one operation's backup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    Released,
    /// The operation held no backup, or was already finished
    NothingToRelease,
    /// The backup could not be removed; its path is waiting in `take_deferred_cleanup`
    Deferred,
}

/// Lifecycle of an operation. Only `Pending` may transition, and only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Undone,
    /// `undo` was attempted and failed; any backup is kept for manual recovery
    UndoFailed,
    Reset,
}

impl OperationState {
    /// Move out of `Pending`. Returns false if the operation already finished.
    pub(crate) fn finish(&mut self, next: OperationState) -> bool {
        if *self != OperationState::Pending {
            return false;
        }
        *self = next;
        true
    }
}

/// One reversible filesystem mutation.
///
/// Neither method may panic or propagate an error: failures are logged by the
/// implementation and reported only through the returned outcome.
pub trait UndoableOperation: Send + Debug {
    fn undo(&mut self) -> UndoOutcome;

    fn reset(&mut self) -> ResetOutcome;

    fn state(&self) -> OperationState;

    /// The path an `undo` of this operation would touch
    fn affected_path(&self) -> &Path;

    /// A backup path whose removal failed and still needs cleaning up
    fn take_deferred_cleanup(&mut self) -> Option<PathBuf> {
        None
    }
}

/// Configuration for undo tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    pub enabled: bool,
    /// File name prefix for backup copies
    pub backup_prefix: String,
    /// Where backups are written; the system temp dir when unset
    pub backup_dir: Option<PathBuf>,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { enabled: true, backup_prefix: "scaffold-undo-".to_string(), backup_dir: None }
    }
}

impl UndoConfig {
    pub fn backups(&self) -> Backups {
        Backups::new(&self.backup_prefix, self.backup_dir.clone())
    }

    pub fn build_manager(&self) -> UndoManager {
        let mut manager = UndoManager::new();
        manager.set_undo_enabled(self.enabled);
        manager
    }
}
