//! Stack of undoable operations with bulk undo and reset

use super::UndoableOperation;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Notification sent after a bulk action on the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoEvent {
    Undo,
    Reset,
    Flush,
}

pub trait UndoListener: Send + Sync {
    fn on_undo_event(&self, event: UndoEvent);
}

impl<F> UndoListener for F
where
    F: Fn(UndoEvent) + Send + Sync,
{
    fn on_undo_event(&self, event: UndoEvent) {
        self(event)
    }
}

/// LIFO stack of operations for one generation run
pub struct UndoManager {
    stack: Vec<Box<dyn UndoableOperation>>,
    listeners: Vec<Arc<dyn UndoListener>>,
    enabled: bool,
    pending_cleanup: Vec<PathBuf>,
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoManager {
    /// Create a manager with tracking enabled
    pub fn new() -> Self {
        Self { stack: Vec::new(), listeners: Vec::new(), enabled: true, pending_cleanup: Vec::new() }
    }

    /// Track an operation. With tracking disabled it is reset straight away.
    pub fn add<O>(&mut self, op: O)
    where
        O: UndoableOperation + 'static,
    {
        let mut op: Box<dyn UndoableOperation> = Box::new(op);
        if self.enabled {
            debug!("Tracking undo for {}", op.affected_path().display());
            self.stack.push(op);
        } else {
            op.reset();
            self.collect_cleanup(op.as_mut());
        }
    }

    /// Undo every operation, newest first.
    ///
    /// After the first failure the remaining operations are reset instead.
    /// Returns true if every operation was undone.
    pub fn undo(&mut self) -> bool {
        let total = self.stack.len();
        let mut undone = 0;
        let mut undoing = true;

        while let Some(mut op) = self.stack.pop() {
            if undoing {
                if op.undo().is_undone() {
                    undone += 1;
                } else {
                    warn!(
                        "Undo failed for {}, resetting {} older operations",
                        op.affected_path().display(),
                        self.stack.len()
                    );
                    undoing = false;
                }
            } else {
                op.reset();
            }
            self.collect_cleanup(op.as_mut());
        }

        info!("Undid {} of {} operations", undone, total);
        self.notify(UndoEvent::Undo);
        undoing
    }

    /// Accept every operation and release the backups they hold
    pub fn reset(&mut self) {
        let total = self.stack.len();
        self.reset_all();
        debug!("Reset {} operations", total);
        self.notify(UndoEvent::Reset);
    }

    /// Tell listeners to persist their view of the current state
    pub fn flush(&self) {
        self.notify(UndoEvent::Flush);
    }

    pub fn add_undo_listener(&mut self, listener: Arc<dyn UndoListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_undo_listener(&mut self, listener: &Arc<dyn UndoListener>) {
        self.listeners.retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    pub fn set_undo_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_undo_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Paths an `undo` would touch, newest first
    pub fn affected_paths(&self) -> Vec<PathBuf> {
        self.stack.iter().rev().map(|op| op.affected_path().to_path_buf()).collect()
    }

    /// Backups whose removal failed and are waiting for another attempt
    pub fn pending_cleanup(&self) -> &[PathBuf] {
        &self.pending_cleanup
    }

    /// Retry removal of deferred backups. Returns how many were removed.
    pub fn drain_pending_cleanup(&mut self) -> usize {
        let before = self.pending_cleanup.len();
        self.pending_cleanup.retain(|path| match remove_backup(path) {
            Ok(()) => false,
            Err(e) => {
                warn!("Backup {} still not removable: {}", path.display(), e);
                true
            }
        });
        before - self.pending_cleanup.len()
    }

    fn reset_all(&mut self) {
        while let Some(mut op) = self.stack.pop() {
            op.reset();
            self.collect_cleanup(op.as_mut());
        }
    }

    fn collect_cleanup(&mut self, op: &mut dyn UndoableOperation) {
        if let Some(path) = op.take_deferred_cleanup() {
            debug!("Deferring cleanup of {}", path.display());
            self.pending_cleanup.push(path);
        }
    }

    fn notify(&self, event: UndoEvent) {
        for listener in &self.listeners {
            listener.on_undo_event(event);
        }
    }
}

impl Drop for UndoManager {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            debug!("Dropping undo manager with {} pending operations", self.stack.len());
            self.reset_all();
        }
        self.drain_pending_cleanup();
    }
}

fn remove_backup(path: &Path) -> io::Result<()> {
    let removed = match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) => Err(e),
    };
    match removed {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
