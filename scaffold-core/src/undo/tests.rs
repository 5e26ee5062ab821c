// Undo stack behaviour tests

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records which methods were called, in order, across all mock operations
    #[derive(Debug)]
    struct MockOperation {
        name: &'static str,
        path: PathBuf,
        undo_result: UndoOutcome,
        calls: Arc<Mutex<Vec<String>>>,
        state: OperationState,
        deferred: Option<PathBuf>,
    }

    impl MockOperation {
        fn new(name: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                path: PathBuf::from(name),
                undo_result: UndoOutcome::Undone,
                calls: calls.clone(),
                state: OperationState::Pending,
                deferred: None,
            }
        }

        fn failing(mut self) -> Self {
            self.undo_result = UndoOutcome::Failed;
            self
        }

        fn deferring(mut self, path: &Path) -> Self {
            self.deferred = Some(path.to_path_buf());
            self
        }
    }

    impl UndoableOperation for MockOperation {
        fn undo(&mut self) -> UndoOutcome {
            self.calls.lock().unwrap().push(format!("undo {}", self.name));
            self.state = if self.undo_result.is_undone() {
                OperationState::Undone
            } else {
                OperationState::UndoFailed
            };
            self.undo_result
        }

        fn reset(&mut self) -> ResetOutcome {
            self.calls.lock().unwrap().push(format!("reset {}", self.name));
            self.state = OperationState::Reset;
            if self.deferred.is_some() { ResetOutcome::Deferred } else { ResetOutcome::Released }
        }

        fn state(&self) -> OperationState {
            self.state
        }

        fn affected_path(&self) -> &Path {
            &self.path
        }

        fn take_deferred_cleanup(&mut self) -> Option<PathBuf> {
            if self.state == OperationState::Reset { self.deferred.take() } else { None }
        }
    }

    fn call_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_create_file_then_undo_leaves_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("generated.rs");

        let mut manager = UndoManager::new();
        CreateFile::new(&mut manager, &path).unwrap();
        assert!(path.is_file());

        assert!(manager.undo());
        assert!(!path.exists());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_delete_file_then_undo_restores_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        fs::write(&path, &content).unwrap();

        let mut manager = UndoManager::new();
        DeleteFile::new(&mut manager, &path).unwrap();
        assert!(!path.exists());

        assert!(manager.undo());
        assert_eq!(fs::read(&path).unwrap(), content);
    }

    #[test]
    fn test_delete_file_registers_itself() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.md");
        fs::write(&path, "notes").unwrap();

        let mut manager = UndoManager::new();
        DeleteFile::new(&mut manager, &path).unwrap();
        assert!(!path.exists());
        assert_eq!(manager.affected_paths(), vec![path.clone()]);

        assert!(manager.undo());
        assert_eq!(fs::read_to_string(&path).unwrap(), "notes");
    }

    #[test]
    fn test_update_file_then_undo_restores_previous_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Cargo.toml");
        fs::write(&path, "[package]\nname = \"before\"\n").unwrap();

        let mut manager = UndoManager::new();
        UpdateFile::new(&mut manager, &path).unwrap();
        fs::write(&path, "[package]\nname = \"after\"\n").unwrap();

        assert!(manager.undo());
        assert_eq!(fs::read_to_string(&path).unwrap(), "[package]\nname = \"before\"\n");
    }

    #[test]
    fn test_create_nested_directory_then_undo_removes_top() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a/b/c");

        let mut manager = UndoManager::new();
        CreateDirectory::new(&mut manager, &nested).unwrap();
        assert!(nested.is_dir());

        assert!(manager.undo());
        assert!(!temp_dir.path().join("a").exists());
        assert!(temp_dir.path().exists());
    }

    #[test]
    fn test_delete_directory_then_undo_restores_tree() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("src");
        fs::create_dir_all(dir.join("bin")).unwrap();
        fs::write(dir.join("lib.rs"), "pub fn lib() {}").unwrap();
        fs::write(dir.join("bin/main.rs"), "fn main() {}").unwrap();

        let mut manager = UndoManager::new();
        DeleteDirectory::new(&mut manager, &dir).unwrap();
        assert!(!dir.exists());

        assert!(manager.undo());
        assert_eq!(fs::read_to_string(dir.join("lib.rs")).unwrap(), "pub fn lib() {}");
        assert_eq!(fs::read_to_string(dir.join("bin/main.rs")).unwrap(), "fn main() {}");
    }

    #[test]
    fn test_operations_undo_in_reverse_order() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("module");
        let file = dir.join("mod.rs");

        let mut manager = UndoManager::new();
        CreateDirectory::new(&mut manager, &dir).unwrap();
        CreateFile::new(&mut manager, &file).unwrap();
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.affected_paths()[0], file);

        // The file goes first, so removing the directory afterwards succeeds
        assert!(manager.undo());
        assert!(!dir.exists());
    }

    #[test]
    fn test_reset_only_resets_and_empties_stack() {
        let calls = call_log();
        let mut manager = UndoManager::new();
        manager.add(MockOperation::new("a", &calls));
        manager.add(MockOperation::new("b", &calls));
        manager.add(MockOperation::new("c", &calls));

        manager.reset();

        assert!(manager.is_empty());
        assert_eq!(*calls.lock().unwrap(), vec!["reset c", "reset b", "reset a"]);
    }

    #[test]
    fn test_failed_undo_resets_older_operations() {
        let calls = call_log();
        let mut manager = UndoManager::new();
        manager.add(MockOperation::new("oldest", &calls));
        manager.add(MockOperation::new("middle", &calls));
        manager.add(MockOperation::new("broken", &calls).failing());
        manager.add(MockOperation::new("newest", &calls));

        assert!(!manager.undo());

        assert!(manager.is_empty());
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["undo newest", "undo broken", "reset middle", "reset oldest"]
        );
    }

    #[test]
    fn test_undo_of_empty_stack_succeeds() {
        let mut manager = UndoManager::new();
        assert!(manager.undo());
    }

    #[test]
    fn test_disabled_tracking_resets_immediately() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "a").unwrap();

        let mut manager = UndoManager::new();
        manager.set_undo_enabled(false);
        assert!(!manager.is_undo_enabled());

        DeleteFile::new(&mut manager, &path).unwrap();
        assert!(manager.is_empty());

        // Nothing left to undo, so the file stays deleted
        assert!(manager.undo());
        assert!(!path.exists());
    }

    #[test]
    fn test_config_builds_disabled_manager() {
        let config = UndoConfig { enabled: false, ..Default::default() };
        let manager = config.build_manager();
        assert!(!manager.is_undo_enabled());
    }

    #[test]
    fn test_listeners_receive_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: Arc<dyn UndoListener> = Arc::new(move |event: UndoEvent| {
            sink.lock().unwrap().push(event);
        });

        let mut manager = UndoManager::new();
        manager.add_undo_listener(listener.clone());
        manager.undo();
        manager.reset();
        manager.flush();

        manager.remove_undo_listener(&listener);
        manager.flush();

        assert_eq!(*seen.lock().unwrap(), vec![UndoEvent::Undo, UndoEvent::Reset, UndoEvent::Flush]);
    }

    #[test]
    fn test_deferred_cleanup_is_listed_and_drained() {
        let temp_dir = TempDir::new().unwrap();
        let stale = temp_dir.path().join("stale.bak");
        fs::write(&stale, "stale").unwrap();

        let calls = call_log();
        let mut manager = UndoManager::new();
        manager.add(MockOperation::new("op", &calls).deferring(&stale));
        manager.reset();

        assert_eq!(manager.pending_cleanup(), &[stale.clone()]);
        assert_eq!(manager.drain_pending_cleanup(), 1);
        assert!(manager.pending_cleanup().is_empty());
        assert!(!stale.exists());
    }

    #[test]
    fn test_drop_resets_pending_operations() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.txt");
        fs::write(&path, "a").unwrap();

        let backup_dir = temp_dir.path().join("backups");
        fs::create_dir(&backup_dir).unwrap();
        let backups = Backups::new("drop-", Some(backup_dir.clone()));

        {
            let mut manager = UndoManager::new();
            UpdateFile::with_backups(&mut manager, &path, &backups).unwrap();
            assert_eq!(fs::read_dir(&backup_dir).unwrap().count(), 1);
        }

        assert_eq!(fs::read_dir(&backup_dir).unwrap().count(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a");
    }
}
