//! Undoable single-file mutations

use super::backup::{Backup, Backups, release_into};
use super::{
    OperationState, ResetOutcome, Result, UndoError, UndoManager, UndoOutcome, UndoableOperation,
    existing, existing_entry,
};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Creates an empty file. Undo deletes it again.
#[derive(Debug)]
pub struct CreateFile {
    path: PathBuf,
    state: OperationState,
}

impl CreateFile {
    /// Create an empty file and push the operation onto `manager`.
    ///
    /// Fails with [`UndoError::AlreadyExists`] if anything is at `path`, and
    /// with an I/O error if the parent directory is missing.
    pub fn new(manager: &mut UndoManager, path: impl AsRef<Path>) -> Result<()> {
        manager.add(Self::perform(path.as_ref())?);
        Ok(())
    }

    pub(crate) fn perform(path: &Path) -> Result<Self> {
        OpenOptions::new().write(true).create_new(true).open(path).map_err(|source| {
            match source.kind() {
                io::ErrorKind::AlreadyExists => UndoError::AlreadyExists(path.to_path_buf()),
                _ => UndoError::io(path, source),
            }
        })?;

        debug!("Created file {}", path.display());
        Ok(Self { path: path.to_path_buf(), state: OperationState::Pending })
    }
}

impl UndoableOperation for CreateFile {
    fn undo(&mut self) -> UndoOutcome {
        if !self.state.finish(OperationState::Undone) {
            warn!("Undo of {} ignored, operation already {:?}", self.path.display(), self.state);
            return UndoOutcome::Failed;
        }

        // A file removed behind our back counts as a failure: the state on disk
        // is no longer what this operation produced.
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Undo: removed {}", self.path.display());
                UndoOutcome::Undone
            }
            Err(e) => {
                self.state = OperationState::UndoFailed;
                warn!("Undo: could not remove {}: {}", self.path.display(), e);
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
        &self.path
    }
}

/// Deletes a file after backing it up. Undo restores the exact bytes.
///
/// Symlinks are refused with [`UndoError::NotAFile`]; a byte backup of the
/// target could only ever come back as a regular file.
#[derive(Debug)]
pub struct DeleteFile {
    path: PathBuf,
    backup: Option<Backup>,
    deferred: Option<PathBuf>,
    state: OperationState,
}

impl DeleteFile {
    pub fn new(manager: &mut UndoManager, path: impl AsRef<Path>) -> Result<()> {
        Self::with_backups(manager, path, &Backups::default())
    }

    /// Delete the file, keeping its bytes in a backup taken from `backups`,
    /// and push the operation onto `manager`
    pub fn with_backups(
        manager: &mut UndoManager,
        path: impl AsRef<Path>,
        backups: &Backups,
    ) -> Result<()> {
        manager.add(Self::perform(path.as_ref(), backups)?);
        Ok(())
    }

    pub(crate) fn perform(path: &Path, backups: &Backups) -> Result<Self> {
        if !existing_entry(path)?.is_file() {
            return Err(UndoError::NotAFile(path.to_path_buf()));
        }

        let backup = backups.copy_file(path)?;
        if let Err(source) = fs::remove_file(path) {
            if let Err(left) = backup.release() {
                warn!("Backup {} left behind", left.display());
            }
            return Err(UndoError::io(path, source));
        }

        debug!("Deleted file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            backup: Some(backup),
            deferred: None,
            state: OperationState::Pending,
        })
    }
}

impl UndoableOperation for DeleteFile {
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

/// Records the content of a file that is about to be overwritten. Undo copies
/// the recorded bytes back.
///
/// The operation only takes the backup; the caller performs the write.
#[derive(Debug)]
pub struct UpdateFile {
    path: PathBuf,
    backup: Option<Backup>,
    deferred: Option<PathBuf>,
    state: OperationState,
}

impl UpdateFile {
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
        if !existing(path)?.is_file() {
            return Err(UndoError::NotAFile(path.to_path_buf()));
        }

        let backup = backups.copy_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            backup: Some(backup),
            deferred: None,
            state: OperationState::Pending,
        })
    }
}

impl UndoableOperation for UpdateFile {
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

/// Shared undo for backup-holding operations. A failed restore keeps the backup.
pub(crate) fn restore(
    target: &Path,
    state: &mut OperationState,
    backup: &mut Option<Backup>,
    deferred: &mut Option<PathBuf>,
) -> UndoOutcome {
    if !state.finish(OperationState::Undone) {
        warn!("Undo of {} ignored, operation already {:?}", target.display(), state);
        return UndoOutcome::Failed;
    }

    let Some(saved) = backup.take() else {
        *state = OperationState::UndoFailed;
        warn!("Undo: no backup held for {}", target.display());
        return UndoOutcome::Failed;
    };

    match saved.restore_to(target) {
        Ok(()) => {
            debug!("Undo: restored {}", target.display());
            release_into(saved, deferred);
            UndoOutcome::Undone
        }
        Err(e) => {
            *state = OperationState::UndoFailed;
            warn!(
                "Undo: could not restore {}: {}. Backup kept at {}",
                target.display(),
                e,
                saved.path().display()
            );
            *backup = Some(saved);
            UndoOutcome::Failed
        }
    }
}

pub(crate) fn release(
    state: &mut OperationState,
    backup: &mut Option<Backup>,
    deferred: &mut Option<PathBuf>,
) -> ResetOutcome {
    if !state.finish(OperationState::Reset) {
        return ResetOutcome::NothingToRelease;
    }
    match backup.take() {
        Some(saved) => release_into(saved, deferred),
        None => ResetOutcome::NothingToRelease,
    }
}
