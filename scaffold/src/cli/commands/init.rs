//! Write the default project configuration

use crate::cli::app::InitArgs;
use anyhow::{Context, Result};
use scaffold_core::ScaffoldConfig;
use scaffold_core::config::DEFAULT_PATH;
use std::path::{Path, PathBuf};
use tracing::info;

/// Execute the init command
pub fn execute(args: InitArgs, config_path: Option<&Path>) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_PATH));
    write_default(&path, args.force)?;
    Ok(())
}

/// Returns false when an existing file was left alone
fn write_default(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        println!("Config file already exists at {}", path.display());
        return Ok(false);
    }

    ScaffoldConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote default configuration to {}", path.display());
    println!("Created {} with default configuration", path.display());
    Ok(true)
}
