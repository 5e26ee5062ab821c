//! Undoable directory mutations

use super::backup::{Backup, Backups};
use super::file_ops::{release, restore};
use super::{
    OperationState, ResetOutcome, Result, UndoError, UndoManager, UndoOutcome, UndoableOperation,
    existing_entry,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Creates a directory and any missing ancestors.
///
/// Undo removes the topmost ancestor that did not exist beforehand, so
/// creating `a/b/c` under an empty root and undoing leaves the root empty.
#[derive(Debug)]
pub struct CreateDirectory {
    path: PathBuf,
    delete_from: PathBuf,
    state: OperationState,
}

impl CreateDirectory {
    /// Create the directory, push the operation onto `manager` and return the
    /// topmost directory that was brought into existence
    pub fn new(manager: &mut UndoManager, path: impl AsRef<Path>) -> Result<PathBuf> {
        let op = Self::perform(path.as_ref())?;
        let delete_from = op.delete_from.clone();
        manager.add(op);
        Ok(delete_from)
    }

    pub(crate) fn perform(requested: &Path) -> Result<Self> {
        if fs::symlink_metadata(requested).is_ok() {
            return Err(UndoError::AlreadyExists(requested.to_path_buf()));
        }

        let path = std::path::absolute(requested).map_err(|e| UndoError::io(requested, e))?;
        let mut delete_from = path.clone();
        for ancestor in path.ancestors().skip(1) {
            if fs::symlink_metadata(ancestor).is_ok() {
                break;
            }
            delete_from = ancestor.to_path_buf();
        }

        if let Err(source) = fs::create_dir_all(&path) {
            if delete_from.exists() {
                if let Err(e) = fs::remove_dir_all(&delete_from) {
                    warn!("Could not clean up {}: {}", delete_from.display(), e);
                }
            }
            return Err(UndoError::io(&path, source));
        }

        debug!("Created directory {} (new from {})", path.display(), delete_from.display());
        Ok(Self { path, delete_from, state: OperationState::Pending })
    }
}

impl UndoableOperation for CreateDirectory {
    fn undo(&mut self) -> UndoOutcome {
        if !self.state.finish(OperationState::Undone) {
            warn!("Undo of {} ignored, operation already {:?}", self.path.display(), self.state);
            return UndoOutcome::Failed;
        }

        match fs::remove_dir_all(&self.delete_from) {
            Ok(()) => {
                debug!("Undo: removed {}", self.delete_from.display());
                UndoOutcome::Undone
            }
            Err(e) => {
                self.state = OperationState::UndoFailed;
                warn!("Undo: could not remove {}: {}", self.delete_from.display(), e);
                UndoOutcome::Failed
            }
        }
    }

    fn reset(&mut self) -> ResetOutcome {
        self.state.finish(OperationState::Reset);
        ResetOutcome::NothingToRelease
    }

    fn state(&self) -> OperationState {
        self.state
    }

    fn affected_path(&self) -> &Path {
        &self.delete_from
    }
}

/// Deletes a directory tree after copying it aside. Undo copies it back.
///
/// A symlink to a directory is refused with [`UndoError::NotADirectory`].
#[derive(Debug)]
pub struct DeleteDirectory {
    path: PathBuf,
    backup: Option<Backup>,
    deferred: Option<PathBuf>,
    state: OperationState,
}

impl DeleteDirectory {
    pub fn new(manager: &mut UndoManager, path: impl AsRef<Path>) -> Result<()> {
        Self::with_backups(manager, path, &Backups::default())
    }

    pub fn with_backups(
        manager: &mut UndoManager,
        path: impl AsRef<Path>,
        backups: &Backups,
    ) -> Result<()> {
        manager.add(Self::perform(path.as_ref(), backups)?);
        Ok(())
    }

    pub(crate) fn perform(path: &Path, backups: &Backups) -> Result<Self> {
        if !existing_entry(path)?.is_dir() {
            return Err(UndoError::NotADirectory(path.to_path_buf()));
        }

        let backup = backups.copy_directory(path)?;
        if let Err(source) = fs::remove_dir_all(path) {
            // Partial removal: put back whatever went missing before giving up
            if let Err(e) = backup.restore_to(path) {
                warn!("Could not restore {} after failed delete: {}", path.display(), e);
            }
            if let Err(left) = backup.release() {
                warn!("Backup {} left behind", left.display());
            }
            return Err(UndoError::io(path, source));
        }

        debug!("Deleted directory {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            backup: Some(backup),
            deferred: None,
            state: OperationState::Pending,
        })
    }
}

impl UndoableOperation for DeleteDirectory {
    fn undo(&mut self) -> UndoOutcome {
        restore(&self.path, &mut self.state, &mut self.backup, &mut self.deferred)
    }

    fn reset(&mut self) -> ResetOutcome {
        release(&mut self.state, &mut self.backup, &mut self.deferred)
    }

    fn state(&self) -> OperationState {
        self.state
    }

    fn affected_path(&self) -> &Path {
        &self.path
    }

    fn take_deferred_cleanup(&mut self) -> Option<PathBuf> {
        self.deferred.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_delete_from_is_topmost_new_ancestor() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("a")).unwrap();

        let mut manager = UndoManager::new();
        let top = CreateDirectory::new(&mut manager, temp_dir.path().join("a/b/c")).unwrap();
        assert!(top.ends_with("a/b"));
        assert!(temp_dir.path().join("a/b/c").is_dir());
        assert_eq!(manager.affected_paths(), vec![top]);
    }

    #[test]
    fn test_create_directory_refuses_existing_path() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            CreateDirectory::perform(temp_dir.path()),
            Err(UndoError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_delete_directory_requires_a_directory() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();

        let mut manager = UndoManager::new();
        assert!(matches!(
            DeleteDirectory::new(&mut manager, &file),
            Err(UndoError::NotADirectory(_))
        ));
        assert!(manager.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_delete_directory_refuses_symlink_to_directory() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("real");
        let link = temp_dir.path().join("alias");
        fs::create_dir_all(target.join("inner")).unwrap();
        fs::write(target.join("inner/x.txt"), "x").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut manager = UndoManager::new();
        assert!(matches!(
            DeleteDirectory::new(&mut manager, &link),
            Err(UndoError::NotADirectory(_))
        ));
        assert!(manager.is_empty());
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(target.join("inner/x.txt")).unwrap(), "x");
    }

    #[test]
    fn test_delete_directory_reset_drops_backup() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("gone");
        fs::create_dir_all(dir.join("inner")).unwrap();
        fs::write(dir.join("inner/x.txt"), "x").unwrap();

        let mut op = DeleteDirectory::perform(&dir, &Backups::default()).unwrap();
        assert!(!dir.exists());
        let backup = op.backup.as_ref().unwrap().path().to_path_buf();
        assert!(backup.join("inner/x.txt").is_file());

        assert_eq!(op.reset(), ResetOutcome::Released);
        assert!(!backup.exists());
        assert!(!dir.exists());
    }
}
