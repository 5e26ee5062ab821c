//! Ant-style path search

use super::timestamp;
use crate::cli::app::FindArgs;
use anyhow::{Context, Result};
use scaffold_core::PollingFileMonitorService;
use serde_json::json;

/// Execute the find command
pub fn execute(args: FindArgs) -> Result<()> {
    let service = PollingFileMonitorService::new();
    let matches = service
        .find_matching_ant_path(&args.pattern)
        .with_context(|| format!("Cannot search '{}'", args.pattern))?;

    for details in &matches {
        if args.json {
            let line = json!({
                "path": details.path,
                "modified": timestamp(details),
            });
            println!("{}", line);
        } else {
            println!("{}", details.path.display());
        }
    }

    if !args.json {
        println!("{} match(es)", matches.len());
    }
    Ok(())
}
