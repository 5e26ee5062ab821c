//! Core functionality for scaffold
//!
//! This crate contains the file plumbing a code generator sits on:
//! polling change detection over monitored paths, and transactional undo
//! for the files and directories a generation run touches.

pub mod config;
pub mod file_manager;
pub mod monitor;
pub mod undo;

pub use config::ScaffoldConfig;
pub use file_manager::FileManager;
pub use monitor::{FileEvent, FileOperation, MonitoringRequest, PollingFileMonitorService};
pub use undo::UndoManager;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ScaffoldConfig::default();
        assert_eq!(config.monitor.requests, vec![".,CUD,**".to_string()]);
        assert!(config.undo.enabled);
    }

    #[test]
    fn test_file_manager_starts_empty() {
        let files = FileManager::new();
        assert!(files.undo_manager().is_empty());
        assert!(files.undo_manager().is_undo_enabled());
    }
}
