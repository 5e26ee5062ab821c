//! Generator-facing file operations with undo and monitor hints
//!
//! Every mutation goes through an undo operation first, so a failed run can
//! be rolled back with [`FileManager::rollback`]. When a monitor is attached
//! each mutation also leaves a hint, letting the next `scan_notified` pick the
//! change up without a full walk.

use crate::monitor::PollingFileMonitorService;
use crate::undo::{
    Backups, CreateDirectory, CreateFile, DeleteDirectory, DeleteFile, UndoConfig, UndoError,
    UndoManager, UpdateFile,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FileManagerError {
    #[error(transparent)]
    Undo(#[from] UndoError),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, FileManagerError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> FileManagerError + '_ {
    move |source| FileManagerError::Io { path: path.to_path_buf(), source }
}

#[derive(Debug, Clone, Copy)]
enum Hint {
    Created,
    Changed,
    Deleted,
}

/// Performs file mutations for one generation run
pub struct FileManager {
    undo: UndoManager,
    backups: Backups,
    monitor: Option<Arc<PollingFileMonitorService>>,
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FileManager {
    pub fn new() -> Self {
        Self { undo: UndoManager::new(), backups: Backups::default(), monitor: None }
    }

    /// Build from the `[undo]` configuration section
    pub fn from_config(config: &UndoConfig) -> Self {
        Self { undo: config.build_manager(), backups: config.backups(), monitor: None }
    }

    pub fn with_monitor(mut self, monitor: Arc<PollingFileMonitorService>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    /// Create a new file with `contents`, creating missing parent directories
    pub fn create_file(&mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                self.create_directory(parent)?;
            }
        }

        CreateFile::new(&mut self.undo, path)?;
        fs::write(path, contents).map_err(io_error(path))?;

        debug!("Created {}", path.display());
        self.hint(path, Hint::Created);
        Ok(())
    }

    pub fn create_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let top = CreateDirectory::new(&mut self.undo, path)?;

        debug!("Created directory {}", path.display());
        self.hint(&top, Hint::Created);
        Ok(())
    }

    /// Replace the content of an existing file
    pub fn update_file(&mut self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) -> Result<()> {
        let path = path.as_ref();
        UpdateFile::with_backups(&mut self.undo, path, &self.backups)?;
        fs::write(path, contents).map_err(io_error(path))?;

        debug!("Updated {}", path.display());
        self.hint(path, Hint::Changed);
        Ok(())
    }

    /// Write `contents` unless the file already holds exactly those bytes.
    /// Returns whether anything was written.
    pub fn create_or_update_file(
        &mut self,
        path: impl AsRef<Path>,
        contents: impl AsRef<[u8]>,
    ) -> Result<bool> {
        let path = path.as_ref();
        let contents = contents.as_ref();

        if !path.exists() {
            self.create_file(path, contents)?;
            return Ok(true);
        }

        let current = fs::read(path).map_err(io_error(path))?;
        if current == contents {
            debug!("Unchanged {}", path.display());
            return Ok(false);
        }

        self.update_file(path, contents)?;
        Ok(true)
    }

    /// Delete a file or a whole directory tree. Symlinks are refused.
    pub fn delete(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let metadata = fs::symlink_metadata(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => UndoError::NotFound(path.to_path_buf()).into(),
            _ => FileManagerError::Io { path: path.to_path_buf(), source },
        })?;

        if metadata.is_dir() {
            DeleteDirectory::with_backups(&mut self.undo, path, &self.backups)?;
        } else {
            DeleteFile::with_backups(&mut self.undo, path, &self.backups)?;
        }

        debug!("Deleted {}", path.display());
        self.hint(path, Hint::Deleted);
        Ok(())
    }

    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        fs::read_to_string(path).map_err(io_error(path))
    }

    /// Accept every change made so far and release backups
    pub fn commit(&mut self) {
        info!("Committing {} file operations", self.undo.len());
        self.undo.reset();
    }

    /// Reverse every change made so far. Returns true if all were reversed.
    pub fn rollback(&mut self) -> bool {
        let affected = self.undo.affected_paths();
        info!("Rolling back {} file operations", affected.len());

        let complete = self.undo.undo();
        if !complete {
            warn!("Rollback incomplete, see earlier warnings for kept backups");
        }

        for path in &affected {
            let hint = if path.exists() { Hint::Created } else { Hint::Deleted };
            self.hint(path, hint);
        }
        complete
    }

    pub fn flush(&self) {
        self.undo.flush();
    }

    fn hint(&self, path: &Path, hint: Hint) {
        let Some(monitor) = &self.monitor else {
            return;
        };
        let recorded = match hint {
            Hint::Created => monitor.notify_created(path),
            Hint::Changed => monitor.notify_changed(path),
            Hint::Deleted => monitor.notify_deleted(path),
        };
        if !recorded {
            debug!("No monitor covers {}", path.display());
        }
    }
}
