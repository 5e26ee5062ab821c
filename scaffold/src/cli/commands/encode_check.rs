//! Validate `<path>,<opcodes>[,**]` request encodings

use crate::cli::app::EncodeCheckArgs;
use anyhow::{Result, bail};
use path_patterns::request_encoding;
use scaffold_core::MonitoringRequest;

/// Execute the encode-check command. Fails if any request is invalid.
pub fn execute(args: EncodeCheckArgs) -> Result<()> {
    let mut invalid = 0;

    for text in &args.requests {
        match check(text) {
            Ok(canonical) => println!("ok       {} -> {}", text, canonical),
            Err(reason) => {
                invalid += 1;
                println!("invalid  {}: {}", text, reason);
            }
        }
    }

    if invalid > 0 {
        bail!("{} of {} requests are invalid", invalid, args.requests.len());
    }
    Ok(())
}

/// Canonical encoding of `text`, or the reason it was rejected
fn check(text: &str) -> std::result::Result<String, String> {
    let Some(parts) = request_encoding::split(text) else {
        return Err("expected <path>,<opcodes>[,**] with opcodes from CRUD".to_string());
    };
    if parts.path.trim().is_empty() {
        return Err("empty path".to_string());
    }

    text.parse::<MonitoringRequest>()
        .map(|request| request.to_string())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_canonicalizes_path() {
        let temp_dir = TempDir::new().unwrap();
        let canonical = std::fs::canonicalize(temp_dir.path()).unwrap();

        let encoded = format!("{},DC,**", temp_dir.path().display());
        assert_eq!(check(&encoded).unwrap(), format!("{},CD,**", canonical.display()));
    }

    #[test]
    fn test_check_reports_bad_shape() {
        assert!(check("src").unwrap_err().contains("opcodes"));
        assert!(check("src,XY").is_err());
    }

    #[test]
    fn test_check_reports_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let missing = format!("{},C", temp_dir.path().join("missing").display());
        assert!(check(&missing).is_err());
    }
}
