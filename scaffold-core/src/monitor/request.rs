//! Monitoring requests and their text encoding

use super::{FileOperation, MonitorError, Result};
use path_patterns::request_encoding::{self, SUBTREE_MARKER};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What a request points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    File,
    Directory { watch_subtree: bool },
}

/// An immutable intent to watch one file or one directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MonitoringRequest {
    path: PathBuf,
    notify_on: BTreeSet<FileOperation>,
    kind: RequestKind,
}

impl MonitoringRequest {
    /// Watch a single existing file
    pub fn file(
        path: impl AsRef<Path>,
        notify_on: impl IntoIterator<Item = FileOperation>,
    ) -> Result<Self> {
        let path = canonical_existing(path.as_ref())?;
        if !path.is_file() {
            return Err(MonitorError::NotAFile(path));
        }
        Self::build(path, notify_on, RequestKind::File)
    }

    /// Watch an existing directory, optionally with everything below it
    pub fn directory(
        path: impl AsRef<Path>,
        notify_on: impl IntoIterator<Item = FileOperation>,
        watch_subtree: bool,
    ) -> Result<Self> {
        let path = canonical_existing(path.as_ref())?;
        if !path.is_dir() {
            return Err(MonitorError::NotADirectory(path));
        }
        Self::build(path, notify_on, RequestKind::Directory { watch_subtree })
    }

    fn build(
        path: PathBuf,
        notify_on: impl IntoIterator<Item = FileOperation>,
        kind: RequestKind,
    ) -> Result<Self> {
        let notify_on: BTreeSet<_> =
            notify_on.into_iter().filter(|op| !op.is_lifecycle()).collect();
        if notify_on.is_empty() {
            return Err(MonitorError::NoOperations);
        }
        Ok(Self { path, notify_on, kind })
    }

    /// Canonical path of the watched file or directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn notify_on(&self) -> &BTreeSet<FileOperation> {
        &self.notify_on
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.kind, RequestKind::Directory { .. })
    }

    pub fn watch_subtree(&self) -> bool {
        matches!(self.kind, RequestKind::Directory { watch_subtree: true })
    }

    /// Whether an event of this kind should reach listeners
    pub fn wants(&self, operation: FileOperation) -> bool {
        operation.is_lifecycle() || self.notify_on.contains(&operation)
    }

    /// Scope test against an already canonical path.
    ///
    /// Files match only themselves, plain directories their direct children, and
    /// subtree requests anything at or below the directory.
    pub fn contains(&self, canonical: &Path) -> bool {
        match self.kind {
            RequestKind::File => canonical == self.path,
            RequestKind::Directory { watch_subtree: false } => {
                canonical.parent() == Some(self.path.as_path())
            }
            RequestKind::Directory { watch_subtree: true } => canonical.starts_with(&self.path),
        }
    }
}

impl fmt::Display for MonitoringRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opcodes: String = FileOperation::SUBSCRIBABLE
            .into_iter()
            .filter(|op| self.notify_on.contains(op))
            .filter_map(FileOperation::opcode)
            .collect();
        write!(f, "{},{}", self.path.display(), opcodes)?;
        if self.watch_subtree() {
            write!(f, ",{SUBTREE_MARKER}")?;
        }
        Ok(())
    }
}

impl FromStr for MonitoringRequest {
    type Err = MonitorError;

    fn from_str(text: &str) -> Result<Self> {
        let encoded = request_encoding::split(text)
            .ok_or_else(|| MonitorError::InvalidEncoding(text.to_string()))?;

        let notify_on: Vec<FileOperation> =
            encoded.opcodes.chars().filter_map(FileOperation::from_opcode).collect();

        let path = canonical_existing(Path::new(encoded.path))?;
        if path.is_file() {
            if encoded.watch_subtree {
                return Err(MonitorError::SubtreeOnFile(path));
            }
            Self::file(path, notify_on)
        } else {
            Self::directory(path, notify_on, encoded.watch_subtree)
        }
    }
}

fn canonical_existing(path: &Path) -> Result<PathBuf> {
    fs::canonicalize(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => MonitorError::NotFound(path.to_path_buf()),
        _ => MonitorError::Io { path: path.to_path_buf(), source },
    })
}
