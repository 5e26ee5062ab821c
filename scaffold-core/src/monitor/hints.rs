//! Native watcher bridge that feeds change hints into a polling monitor

use crate::monitor::{PollingFileMonitorService, RequestKind, Result, is_hidden_name};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Forwards platform watcher events to `notify_created/changed/deleted`.
///
/// Hints only speed up `scan_notified`; the polling monitor stays the source of
/// truth. Dropping the source stops the native watcher.
pub struct NotifyHintSource {
    _watcher: RecommendedWatcher,
}

impl NotifyHintSource {
    /// Watch the roots of every request currently registered with `service`
    pub fn for_requests(service: Arc<PollingFileMonitorService>) -> Result<Self> {
        let roots: Vec<(PathBuf, RecursiveMode)> = service
            .requests()
            .into_iter()
            .map(|request| {
                let mode = match request.kind() {
                    RequestKind::Directory { watch_subtree: true } => RecursiveMode::Recursive,
                    _ => RecursiveMode::NonRecursive,
                };
                (request.path().to_path_buf(), mode)
            })
            .collect();

        Self::start(service, &roots)
    }

    /// Start forwarding events for explicit roots
    pub fn start(
        service: Arc<PollingFileMonitorService>,
        roots: &[(PathBuf, RecursiveMode)],
    ) -> Result<Self> {
        let sink = service.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        forward_event(&sink, event);
                    }
                    Err(e) => error!("Watch error: {:?}", e),
                }
            })?;

        for (root, mode) in roots {
            watcher.watch(root, *mode)?;
            info!("Native hints for {:?} (recursive: {})", root, *mode == RecursiveMode::Recursive);
        }

        Ok(Self { _watcher: watcher })
    }
}

/// Translate one native event into hints. Returns how many hints were accepted.
pub(crate) fn forward_event(service: &PollingFileMonitorService, event: Event) -> usize {
    let mut accepted = 0;
    for (index, path) in event.paths.iter().enumerate() {
        if has_hidden_name(path) {
            debug!("Ignoring hidden path: {:?}", path);
            continue;
        }

        let recorded = match event.kind {
            EventKind::Create(_) => service.notify_created(path),
            EventKind::Remove(_) => service.notify_deleted(path),
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => service.notify_deleted(path),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => service.notify_created(path),
            // Both halves of a rename arrive as [from, to]
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if index == 0 => {
                service.notify_deleted(path)
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => service.notify_created(path),
            EventKind::Modify(_) => service.notify_changed(path),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => false,
        };
        if recorded {
            accepted += 1;
        }
    }
    accepted
}

fn has_hidden_name(path: &Path) -> bool {
    path.file_name().is_some_and(is_hidden_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{FileOperation, MonitoringRequest};
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use tempfile::TempDir;

    fn watched_service(root: &Path) -> PollingFileMonitorService {
        let service = PollingFileMonitorService::new();
        let request = MonitoringRequest::directory(
            root,
            [FileOperation::Created, FileOperation::Updated, FileOperation::Deleted],
            true,
        )
        .unwrap();
        assert!(service.add(request));
        service
    }

    #[test]
    fn test_native_events_become_hints() {
        let temp_dir = TempDir::new().unwrap();
        let service = watched_service(temp_dir.path());
        let file = temp_dir.path().join("lib.rs");

        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(file.clone());
        assert_eq!(forward_event(&service, create), 1);

        let modify = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(file.clone());
        assert_eq!(forward_event(&service, modify), 1);

        let remove = Event::new(EventKind::Remove(RemoveKind::File)).add_path(file);
        assert_eq!(forward_event(&service, remove), 1);

        assert!(service.is_dirty());
    }

    #[test]
    fn test_rename_is_split_into_delete_and_create() {
        let temp_dir = TempDir::new().unwrap();
        let service = watched_service(temp_dir.path());

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(temp_dir.path().join("old.rs"))
            .add_path(temp_dir.path().join("new.rs"));
        assert_eq!(forward_event(&service, rename), 2);
    }

    #[test]
    fn test_hidden_and_access_events_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let service = watched_service(temp_dir.path());

        let hidden = Event::new(EventKind::Create(CreateKind::File))
            .add_path(temp_dir.path().join(".swp"));
        assert_eq!(forward_event(&service, hidden), 0);

        let access = Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path(temp_dir.path().join("a.rs"));
        assert_eq!(forward_event(&service, access), 0);

        assert!(!service.is_dirty());
    }
}
