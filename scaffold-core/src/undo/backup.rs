//! Temporary backup copies owned by undo operations

use super::{ResetOutcome, Result, UndoError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Allocates uniquely named backup files and directories
#[derive(Debug, Clone)]
pub struct Backups {
    prefix: String,
    dir: Option<PathBuf>,
}

impl Default for Backups {
    fn default() -> Self {
        Self::new("scaffold-undo-", None)
    }
}

impl Backups {
    pub fn new(prefix: &str, dir: Option<PathBuf>) -> Self {
        Self { prefix: prefix.to_string(), dir }
    }

    /// Byte copy of `original` into a fresh temp file
    pub fn copy_file(&self, original: &Path) -> Result<Backup> {
        let failed = |source| UndoError::Backup { path: original.to_path_buf(), source };

        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.prefix).suffix(".bak");
        let temp = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(failed)?;

        fs::copy(original, temp.path()).map_err(failed)?;
        let path = temp.into_temp_path().keep().map_err(|e| failed(e.error))?;

        debug!("Backed up {} to {}", original.display(), path.display());
        Ok(Backup { path, is_dir: false })
    }

    /// Recursive copy of `original` into a fresh temp directory
    pub fn copy_directory(&self, original: &Path) -> Result<Backup> {
        let failed = |source| UndoError::Backup { path: original.to_path_buf(), source };

        let mut builder = tempfile::Builder::new();
        builder.prefix(&self.prefix);
        let temp = match &self.dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(failed)?;

        // A failed copy drops `temp`, which removes the partial backup
        copy_tree(original, temp.path()).map_err(failed)?;
        let path = temp.keep();

        debug!("Backed up directory {} to {}", original.display(), path.display());
        Ok(Backup { path, is_dir: true })
    }
}

/// A backup exclusively owned by one operation
#[derive(Debug)]
pub struct Backup {
    path: PathBuf,
    is_dir: bool,
}

impl Backup {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the saved content back over `target`
    pub fn restore_to(&self, target: &Path) -> io::Result<()> {
        if self.is_dir {
            fs::create_dir_all(target)?;
            return copy_tree(&self.path, target);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&self.path, target).map(|_| ())
    }

    /// Delete the backup. Hands the path back when it could not be removed.
    pub fn release(self) -> std::result::Result<(), PathBuf> {
        let removed =
            if self.is_dir { fs::remove_dir_all(&self.path) } else { fs::remove_file(&self.path) };
        match removed {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Could not remove backup {}: {}", self.path.display(), e);
                Err(self.path)
            }
        }
    }
}

/// Release `backup`, parking its path in `deferred` if removal fails
pub(crate) fn release_into(backup: Backup, deferred: &mut Option<PathBuf>) -> ResetOutcome {
    match backup.release() {
        Ok(()) => ResetOutcome::Released,
        Err(path) => {
            *deferred = Some(path);
            ResetOutcome::Deferred
        }
    }
}

/// Copy a directory tree, merging into `to` if it already exists
pub(crate) fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let destination = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&destination)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &destination)?;
        } else {
            fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    let target = fs::read_link(from)?;
    if fs::symlink_metadata(to).is_ok() {
        fs::remove_file(to)?;
    }
    std::os::unix::fs::symlink(target, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_backup_restore_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("a.txt");
        fs::write(&original, b"original bytes").unwrap();

        let backups = Backups::new("test-", Some(temp_dir.path().to_path_buf()));
        let backup = backups.copy_file(&original).unwrap();
        assert!(backup.path().file_name().unwrap().to_string_lossy().starts_with("test-"));

        fs::write(&original, b"changed").unwrap();
        backup.restore_to(&original).unwrap();
        assert_eq!(fs::read(&original).unwrap(), b"original bytes");

        let path = backup.path().to_path_buf();
        assert!(backup.release().is_ok());
        assert!(!path.exists());
    }

    #[test]
    fn test_directory_backup_copies_tree() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("tree");
        fs::create_dir_all(original.join("nested/deeper")).unwrap();
        fs::write(original.join("nested/deeper/leaf.txt"), "leaf").unwrap();
        fs::write(original.join("top.txt"), "top").unwrap();

        let backup = Backups::default().copy_directory(&original).unwrap();
        fs::remove_dir_all(&original).unwrap();

        backup.restore_to(&original).unwrap();
        assert_eq!(fs::read_to_string(original.join("nested/deeper/leaf.txt")).unwrap(), "leaf");
        assert_eq!(fs::read_to_string(original.join("top.txt")).unwrap(), "top");
        assert!(backup.release().is_ok());
    }

    #[test]
    fn test_backup_of_missing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = Backups::default().copy_file(&temp_dir.path().join("missing"));
        assert!(matches!(result, Err(UndoError::Backup { .. })));
    }

    #[test]
    fn test_release_of_already_removed_backup_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let original = temp_dir.path().join("a.txt");
        fs::write(&original, "a").unwrap();

        let backup = Backups::default().copy_file(&original).unwrap();
        fs::remove_file(backup.path()).unwrap();

        let mut deferred = None;
        assert_eq!(release_into(backup, &mut deferred), ResetOutcome::Released);
        assert!(deferred.is_none());
    }
}
