//! Polling file monitor: snapshot diffing over registered requests

use super::{
    FileDetails, FileEvent, FileEventListener, FileOperation, MonitorError, MonitoringRequest,
    Result, is_hidden_name, modified_millis,
};
use path_patterns::ant_path::{AntPathMatcher, literal_root};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Observed paths and their last-modified millis as of the latest pass
type Snapshot = BTreeMap<PathBuf, u64>;

/// A registered request together with what was seen for it last time
struct Registration {
    request: MonitoringRequest,
    snapshot: Option<Snapshot>,
}

#[derive(Default)]
struct MonitorState {
    registrations: Vec<Registration>,
    listeners: Vec<Arc<dyn FileEventListener>>,
    notify_changed: BTreeSet<PathBuf>,
    notify_created: BTreeSet<PathBuf>,
    notify_deleted: BTreeSet<PathBuf>,
    /// Every path any pass has ever observed
    all_files: BTreeSet<PathBuf>,
    /// Paths published since each requester last asked
    dirty_by_requester: HashMap<String, BTreeSet<PathBuf>>,
}

/// Polling-based monitor for files and directories.
///
/// Every public method takes the single state lock for its whole duration, so a
/// scan is one consistent, uninterruptible pass. Listeners are called once that
/// lock is released, which lets them record hints or write through a
/// monitor-attached [`crate::FileManager`]. Scheduling passes is up to the caller
/// (see [`super::MonitorDriver`]).
#[derive(Default)]
pub struct PollingFileMonitorService {
    state: Mutex<MonitorState>,
}

impl PollingFileMonitorService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a request. Subtree requests already covered by a registered subtree
    /// request are rejected; registered subtree requests the new one covers are dropped.
    pub fn add(&self, request: MonitoringRequest) -> bool {
        let mut state = self.lock();

        if state.registrations.iter().any(|r| r.request == request) {
            debug!("Request already registered: {}", request);
            return false;
        }

        if request.watch_subtree() {
            let covering = state
                .registrations
                .iter()
                .filter(|r| r.request.watch_subtree())
                .find(|r| request.path().starts_with(r.request.path()));
            if let Some(existing) = covering {
                debug!("Request {} already covered by {}", request, existing.request);
                return false;
            }

            state.registrations.retain(|r| {
                let subsumed =
                    r.request.watch_subtree() && r.request.path().starts_with(request.path());
                if subsumed {
                    info!("Request {} subsumed by {}", r.request, request);
                }
                !subsumed
            });
        }

        info!("Monitoring {}", request);
        state.registrations.push(Registration { request, snapshot: None });
        true
    }

    /// Drop a request, first telling listeners about every path it was tracking
    pub fn remove(&self, request: &MonitoringRequest) -> bool {
        let mut state = self.lock();

        let Some(index) = state.registrations.iter().position(|r| &r.request == request) else {
            return false;
        };
        let registration = state.registrations.remove(index);

        let mut outgoing = Vec::new();
        if let Some(snapshot) = registration.snapshot {
            let events = snapshot.into_iter().map(|(path, millis)| {
                FileEvent::new(FileDetails::new(path, millis), FileOperation::MonitoringFinish)
            });
            state.stage(events, &mut outgoing);
        }
        let delivery = state.delivery(outgoing);
        drop(state);

        info!("Stopped monitoring {}", request);
        delivery.send();
        true
    }

    pub fn requests(&self) -> Vec<MonitoringRequest> {
        self.lock().registrations.iter().map(|r| r.request.clone()).collect()
    }

    pub fn add_listener(&self, listener: Arc<dyn FileEventListener>) {
        self.lock().listeners.push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn FileEventListener>) -> bool {
        let mut state = self.lock();
        let before = state.listeners.len();
        state.listeners.retain(|l| !Arc::ptr_eq(l, listener));
        state.listeners.len() != before
    }

    /// Walk every request, diff against its previous snapshot and publish the result.
    /// Returns the number of events published.
    pub fn scan_all(&self) -> usize {
        let mut state = self.lock();
        if state.registrations.is_empty() {
            return 0;
        }

        let pending_changed = state.notify_changed.clone();
        let mut scanned: Vec<MonitoringRequest> = Vec::new();
        let mut outgoing = Vec::new();

        for index in 0..state.registrations.len() {
            let request = state.registrations[index].request.clone();
            let current = match compute_entries(&request) {
                Ok(current) => current,
                Err(e) => {
                    warn!("Skipping {} for this pass: {}", request, e);
                    continue;
                }
            };
            state.all_files.extend(current.keys().cloned());

            let prior = state.registrations[index].snapshot.take();
            let events = classify(&request, prior.as_ref(), &current, &pending_changed);
            state.registrations[index].snapshot = Some(current);

            state.stage(events, &mut outgoing);
            scanned.push(request);
        }

        // A full walk is authoritative for everything inside the scanned scopes
        let in_scope = |path: &PathBuf| scanned.iter().any(|r| r.contains(path));
        state.notify_changed.retain(|p| !in_scope(p));
        state.notify_created.retain(|p| !in_scope(p));
        state.notify_deleted.retain(|p| !in_scope(p));

        let delivery = state.delivery(outgoing);
        drop(state);

        let published = delivery.send();
        debug!("Full scan published {} events", published);
        published
    }

    /// Publish pending hints without walking the filesystem.
    /// Returns the number of events published.
    pub fn scan_notified(&self) -> usize {
        let mut state = self.lock();
        if state.registrations.is_empty() || !state.is_dirty() {
            return 0;
        }

        let touched: BTreeSet<PathBuf> =
            state.notify_created.union(&state.notify_changed).cloned().collect();
        let created = state.notify_created.clone();
        let deleted = state.notify_deleted.clone();
        let mut consumed: BTreeSet<PathBuf> = BTreeSet::new();
        let mut outgoing = Vec::new();

        for index in 0..state.registrations.len() {
            let registration = &mut state.registrations[index];
            let request = registration.request.clone();
            let Some(snapshot) = registration.snapshot.as_mut() else {
                continue;
            };

            let mut events = Vec::new();
            for path in touched.iter().filter(|p| request.contains(p)) {
                consumed.insert(path.clone());
                if let Some(event) = refresh_entry(&request, snapshot, path) {
                    events.push(event);
                }
            }
            for path in deleted.iter().filter(|p| request.contains(p)) {
                consumed.insert(path.clone());
                events.extend(forget_entries(snapshot, path, created.contains(path)));
            }

            let wanted: Vec<FileEvent> =
                events.into_iter().filter(|e| request.wants(e.operation)).collect();
            state.all_files.extend(wanted.iter().map(|e| e.details.path.clone()));
            state.stage(wanted, &mut outgoing);
        }

        state.notify_created.retain(|p| !consumed.contains(p));
        state.notify_changed.retain(|p| !consumed.contains(p));
        state.notify_deleted.retain(|p| !consumed.contains(p));

        let delivery = state.delivery(outgoing);
        drop(state);

        let published = delivery.send();
        debug!("Hint scan published {} events", published);
        published
    }

    /// Whether `path` falls inside `request`'s scope
    pub fn is_within(&self, request: &MonitoringRequest, path: &Path) -> bool {
        request.contains(&canonical_path(path))
    }

    /// Every existing file or directory matching an ant pattern such as `/project/src/*.rs`
    pub fn find_matching_ant_path(&self, pattern: &str) -> Result<BTreeSet<FileDetails>> {
        let _state = self.lock();

        let root = literal_root(pattern)?;
        let canonical_root = fs::canonicalize(root).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => MonitorError::NotFound(PathBuf::from(root)),
            _ => MonitorError::Io { path: PathBuf::from(root), source },
        })?;
        if !canonical_root.is_dir() {
            return Err(MonitorError::NotADirectory(canonical_root));
        }

        let rest = &pattern[root.len()..];
        let matcher = AntPathMatcher::new(&format!("{}{}", canonical_root.display(), rest))?;

        let mut matches = BTreeSet::new();
        let walker = WalkDir::new(&canonical_root)
            .min_depth(1)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_name(e.file_name()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !matcher.matches(&entry.path().to_string_lossy()) {
                continue;
            }
            match entry.metadata().map_err(io::Error::from).and_then(|m| modified_millis(&m)) {
                Ok(millis) => {
                    matches.insert(FileDetails::new(entry.path(), millis));
                }
                Err(e) => debug!("No timestamp for {}: {}", entry.path().display(), e),
            }
        }

        trace!("Pattern {} matched {} paths", pattern, matches.len());
        Ok(matches)
    }

    /// Everything currently held in any snapshot
    pub fn monitored(&self) -> Vec<FileDetails> {
        self.lock()
            .registrations
            .iter()
            .filter_map(|r| r.snapshot.as_ref())
            .flat_map(|snapshot| {
                snapshot.iter().map(|(path, millis)| FileDetails::new(path.clone(), *millis))
            })
            .collect()
    }

    /// True when hints are waiting. A cheap signal, not a promise that a scan finds changes.
    pub fn is_dirty(&self) -> bool {
        self.lock().is_dirty()
    }

    /// Paths that changed since `requester` last asked. The first call for a
    /// requester returns every path observed so far.
    pub fn dirty_files(&self, requester: &str) -> BTreeSet<PathBuf> {
        let mut state = self.lock();
        let all_files = state.all_files.clone();
        match state.dirty_by_requester.get_mut(requester) {
            Some(dirty) => std::mem::take(dirty),
            None => {
                state.dirty_by_requester.insert(requester.to_string(), BTreeSet::new());
                all_files
            }
        }
    }

    pub fn notify_changed(&self, path: impl AsRef<Path>) -> bool {
        self.record_hint(path.as_ref(), |state| &mut state.notify_changed)
    }

    pub fn notify_created(&self, path: impl AsRef<Path>) -> bool {
        self.record_hint(path.as_ref(), |state| &mut state.notify_created)
    }

    pub fn notify_deleted(&self, path: impl AsRef<Path>) -> bool {
        self.record_hint(path.as_ref(), |state| &mut state.notify_deleted)
    }

    fn record_hint(
        &self,
        path: &Path,
        pending: impl FnOnce(&mut MonitorState) -> &mut BTreeSet<PathBuf>,
    ) -> bool {
        let canonical = canonical_path(path);
        let mut state = self.lock();
        let in_scope = state.registrations.iter().any(|r| {
            r.request.contains(&canonical) && !hidden_below(r.request.path(), &canonical)
        });
        if !in_scope {
            trace!("Dropping hint outside monitored scope: {}", canonical.display());
            return false;
        }
        pending(&mut *state).insert(canonical);
        true
    }
}

impl MonitorState {
    fn is_dirty(&self) -> bool {
        !self.notify_changed.is_empty()
            || !self.notify_created.is_empty()
            || !self.notify_deleted.is_empty()
    }

    /// Mark events dirty for every requester and queue them for delivery
    fn stage(
        &mut self,
        events: impl IntoIterator<Item = FileEvent>,
        outgoing: &mut Vec<FileEvent>,
    ) {
        for event in events {
            trace!("{:?} {}", event.operation, event.details.path.display());
            for dirty in self.dirty_by_requester.values_mut() {
                dirty.insert(event.details.path.clone());
            }
            outgoing.push(event);
        }
    }

    fn delivery(&self, events: Vec<FileEvent>) -> Delivery {
        Delivery { listeners: self.listeners.clone(), events }
    }
}

/// Events of one pass and the listeners registered when it ran
struct Delivery {
    listeners: Vec<Arc<dyn FileEventListener>>,
    events: Vec<FileEvent>,
}

impl Delivery {
    /// Must be called without the state lock held
    fn send(self) -> usize {
        for event in &self.events {
            for listener in &self.listeners {
                listener.on_file_event(event);
            }
        }
        self.events.len()
    }
}

/// Turn the difference between two snapshots into the events `request` wants
fn classify(
    request: &MonitoringRequest,
    prior: Option<&Snapshot>,
    current: &Snapshot,
    pending_changed: &BTreeSet<PathBuf>,
) -> Vec<FileEvent> {
    let Some(prior) = prior else {
        return current
            .iter()
            .map(|(path, millis)| {
                FileEvent::new(FileDetails::new(path.clone(), *millis), FileOperation::MonitoringStart)
            })
            .collect();
    };

    let mut events = Vec::new();
    for (path, millis) in current {
        match prior.get(path) {
            None => {
                events.push(FileEvent::new(
                    FileDetails::new(path.clone(), *millis),
                    FileOperation::Created,
                ));
            }
            // A hinted change inside the same millisecond still counts as an update
            Some(previous) if previous != millis || pending_changed.contains(path) => {
                events.push(
                    FileEvent::new(FileDetails::new(path.clone(), *millis), FileOperation::Updated)
                        .with_prior(FileDetails::new(path.clone(), *previous)),
                );
            }
            Some(_) => {}
        }
    }
    for (path, millis) in prior {
        if !current.contains_key(path) {
            events.push(FileEvent::new(
                FileDetails::new(path.clone(), *millis),
                FileOperation::Deleted,
            ));
        }
    }

    events.retain(|e| request.wants(e.operation));
    events
}

/// Bring one hinted path's snapshot entry up to date
fn refresh_entry(
    request: &MonitoringRequest,
    snapshot: &mut Snapshot,
    path: &Path,
) -> Option<FileEvent> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            debug!("Hinted path no longer readable {}: {}", path.display(), e);
            return None;
        }
    };
    if metadata.is_dir() && !request.watch_subtree() {
        return None;
    }
    let millis = match modified_millis(&metadata) {
        Ok(millis) => millis,
        Err(e) => {
            debug!("No timestamp for {}: {}", path.display(), e);
            return None;
        }
    };

    let details = FileDetails::new(path, millis);
    match snapshot.insert(path.to_path_buf(), millis) {
        None => Some(FileEvent::new(details, FileOperation::Created)),
        Some(previous) => Some(
            FileEvent::new(details, FileOperation::Updated)
                .with_prior(FileDetails::new(path, previous)),
        ),
    }
}

/// Drop a hinted path, and anything below it, from the snapshot. A path that was
/// also hinted as created in this cycle and never made it into the snapshot came
/// and went unseen, so nothing is reported for it.
fn forget_entries(snapshot: &mut Snapshot, path: &Path, created_unseen: bool) -> Vec<FileEvent> {
    if path.exists() {
        debug!("Path hinted as deleted still exists: {}", path.display());
        return Vec::new();
    }

    let gone: Vec<PathBuf> = snapshot.keys().filter(|p| p.starts_with(path)).cloned().collect();
    if gone.is_empty() {
        if created_unseen {
            trace!("Path created and deleted between passes: {}", path.display());
            return Vec::new();
        }
        return vec![FileEvent::new(FileDetails::without_timestamp(path), FileOperation::Deleted)];
    }

    gone.into_iter()
        .filter_map(|p| snapshot.remove(&p).map(|millis| (p, millis)))
        .map(|(p, millis)| FileEvent::new(FileDetails::new(p, millis), FileOperation::Deleted))
        .collect()
}

/// Walk a request's scope. A vanished root yields an empty snapshot so that its
/// former entries are reported as deleted.
fn compute_entries(request: &MonitoringRequest) -> io::Result<Snapshot> {
    let root = request.path();
    let mut entries = Snapshot::new();

    match fs::symlink_metadata(root) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(entries),
        Err(e) => return Err(e),
    }

    let max_depth = match (request.is_directory(), request.watch_subtree()) {
        (false, _) => 0,
        (true, false) => 1,
        (true, true) => usize::MAX,
    };

    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden_name(e.file_name()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(io::Error::from(e)),
            Err(e) => {
                debug!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if entry.depth() == 1 && !request.watch_subtree() && entry.file_type().is_dir() {
            continue;
        }
        let millis =
            match entry.metadata().map_err(io::Error::from).and_then(|m| modified_millis(&m)) {
                Ok(millis) => millis,
                Err(e) => {
                    debug!("No timestamp for {}: {}", entry.path().display(), e);
                    continue;
                }
            };
        entries.insert(entry.into_path(), millis);
    }

    Ok(entries)
}

/// Whether any component of `path` below `root` is hidden
fn hidden_below(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .map(|relative| relative.components().any(|c| is_hidden_name(c.as_os_str())))
        .unwrap_or(false)
}

/// Canonical form of `path`. Paths that no longer exist are resolved through their
/// parent so deletion hints still line up with snapshot keys.
pub(crate) fn canonical_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        if let Ok(parent) = fs::canonicalize(parent) {
            return parent.join(name);
        }
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ops() -> [FileOperation; 3] {
        [FileOperation::Created, FileOperation::Updated, FileOperation::Deleted]
    }

    #[test]
    fn test_nested_subtree_request_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        let service = PollingFileMonitorService::new();

        let outer = MonitoringRequest::directory(temp_dir.path(), ops(), true).unwrap();
        let inner = MonitoringRequest::directory(temp_dir.path().join("a/b"), ops(), true).unwrap();

        assert!(service.add(outer.clone()));
        assert!(!service.add(inner));
        assert_eq!(service.requests(), vec![outer]);
    }

    #[test]
    fn test_broader_subtree_request_replaces_narrower() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("a/b")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("c")).unwrap();
        let service = PollingFileMonitorService::new();

        let narrow = MonitoringRequest::directory(temp_dir.path().join("a/b"), ops(), true).unwrap();
        let unrelated = MonitoringRequest::directory(temp_dir.path().join("c"), ops(), true).unwrap();
        let flat = MonitoringRequest::directory(temp_dir.path().join("a"), ops(), false).unwrap();
        let broad = MonitoringRequest::directory(temp_dir.path().join("a"), ops(), true).unwrap();

        assert!(service.add(narrow));
        assert!(service.add(unrelated.clone()));
        assert!(service.add(flat.clone()));
        assert!(service.add(broad.clone()));

        assert_eq!(service.requests(), vec![unrelated, flat, broad]);
    }

    #[test]
    fn test_duplicate_request_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();
        let service = PollingFileMonitorService::new();

        let request = MonitoringRequest::file(&file, ops()).unwrap();
        assert!(service.add(request.clone()));
        assert!(!service.add(request));
    }

    #[test]
    fn test_hints_outside_scope_are_dropped() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("watched")).unwrap();
        let service = PollingFileMonitorService::new();
        service
            .add(MonitoringRequest::directory(temp_dir.path().join("watched"), ops(), true).unwrap());

        assert!(!service.is_dirty());
        assert!(!service.notify_created(temp_dir.path().join("elsewhere.txt")));
        assert!(!service.notify_changed(temp_dir.path().join("watched/.git/HEAD")));
        assert!(!service.is_dirty());

        assert!(service.notify_created(temp_dir.path().join("watched/new.txt")));
        assert!(service.is_dirty());
    }

    #[test]
    fn test_canonical_path_of_missing_file_uses_parent() {
        let temp_dir = TempDir::new().unwrap();
        let canonical_root = std::fs::canonicalize(temp_dir.path()).unwrap();

        assert_eq!(
            canonical_path(&temp_dir.path().join("gone.txt")),
            canonical_root.join("gone.txt")
        );
    }
}
