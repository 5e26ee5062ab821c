// Command implementations and the output helpers they share

pub mod encode_check;
pub mod find;
pub mod init;
pub mod scan;
pub mod watch;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use scaffold_core::monitor::FileDetails;
use scaffold_core::{FileEvent, FileOperation, MonitoringRequest, ScaffoldConfig};
use serde::Serialize;
use std::path::Path;

/// Requests from the command line, falling back to the configured list
pub(crate) fn resolve_requests(
    given: &[String],
    config: &ScaffoldConfig,
) -> Result<Vec<MonitoringRequest>> {
    if given.is_empty() {
        return config.monitoring_requests().context("Invalid request in configuration");
    }
    given
        .iter()
        .map(|encoded| {
            encoded
                .parse::<MonitoringRequest>()
                .with_context(|| format!("Invalid monitoring request '{}'", encoded))
        })
        .collect()
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<ScaffoldConfig> {
    ScaffoldConfig::load_or_default(path).context("Failed to load configuration")
}

/// One line of `--json` output
#[derive(Debug, Serialize)]
pub(crate) struct EventLine<'a> {
    pub operation: FileOperation,
    pub path: &'a Path,
    pub modified: Option<String>,
    pub previous: Option<String>,
}

impl<'a> EventLine<'a> {
    pub fn from_event(event: &'a FileEvent) -> Self {
        Self {
            operation: event.operation,
            path: &event.details.path,
            modified: timestamp(&event.details),
            previous: event.prior.as_ref().and_then(timestamp),
        }
    }
}

pub(crate) fn timestamp(details: &FileDetails) -> Option<String> {
    details.modified_at().map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true))
}

pub(crate) fn format_event(event: &FileEvent, json: bool) -> String {
    let line = EventLine::from_event(event);
    if json {
        return serde_json::to_string(&line)
            .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e));
    }

    let mut text = format!("{:<16} {}", format!("{:?}", line.operation), line.path.display());
    if let Some(modified) = line.modified {
        text.push_str(&format!("  [{}]", modified));
    }
    if let Some(previous) = line.previous {
        text.push_str(&format!("  (was {})", previous));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_event_line() {
        let event = FileEvent::new(FileDetails::new("/p/a.rs", 0), FileOperation::Created);
        let line = format_event(&event, false);
        assert!(line.starts_with("Created"));
        assert!(line.contains("/p/a.rs"));
        assert!(line.contains("1970-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_json_event_line() {
        let event = FileEvent::new(FileDetails::without_timestamp("/p/a.rs"), FileOperation::Deleted);
        let value: serde_json::Value = serde_json::from_str(&format_event(&event, true)).unwrap();
        assert_eq!(value["operation"], "Deleted");
        assert_eq!(value["path"], "/p/a.rs");
        assert!(value["modified"].is_null());
    }

    #[test]
    fn test_requests_fall_back_to_config() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = ScaffoldConfig::default();
        config.monitor.requests = vec![format!("{},C", temp_dir.path().display())];

        let requests = resolve_requests(&[], &config).unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].watch_subtree());

        let explicit = vec![format!("{},UD,**", temp_dir.path().display())];
        let requests = resolve_requests(&explicit, &config).unwrap();
        assert!(requests[0].watch_subtree());

        assert!(resolve_requests(&["bogus".to_string()], &config).is_err());
    }
}
