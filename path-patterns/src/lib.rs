//! Path pattern utilities for scaffold
//! Split out of the core crate so the compiled patterns are shared by the CLI and the monitor

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("Pattern '{0}' needs a path separator before its first wildcard")]
    MissingSeparator(String),

    #[error("Pattern '{pattern}' could not be compiled: {reason}")]
    Invalid { pattern: String, reason: String },
}

/// Ant-style path patterns where `*` matches within a single path segment
pub mod ant_path {
    use super::*;

    /// Characters treated as segment separators inside a pattern
    const SEPARATORS: [char; 2] = ['/', '\\'];

    /// A compiled ant path pattern
    #[derive(Debug, Clone)]
    pub struct AntPathMatcher {
        regex: Regex,
    }

    impl AntPathMatcher {
        /// Compile a pattern. Every `*` becomes "any run of non-separator characters";
        /// everything else is matched literally.
        pub fn new(pattern: &str) -> Result<Self, PatternError> {
            let mut source = String::with_capacity(pattern.len() + 8);
            source.push('^');
            let mut literal = String::new();
            for ch in pattern.chars() {
                if ch == '*' {
                    source.push_str(&regex::escape(&literal));
                    literal.clear();
                    source.push_str(r"[^/\\]*");
                } else {
                    literal.push(ch);
                }
            }
            source.push_str(&regex::escape(&literal));
            source.push('$');

            let regex = Regex::new(&source).map_err(|e| PatternError::Invalid {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

            Ok(Self { regex })
        }

        /// Check a full path (usually canonical) against the pattern
        pub fn matches(&self, path: &str) -> bool {
            self.regex.is_match(path)
        }
    }

    /// The directory a search for `pattern` has to start from: the text before the
    /// first `*`, cut back to the last separator.
    pub fn literal_root(pattern: &str) -> Result<&str, PatternError> {
        let prefix = match pattern.find('*') {
            Some(star) => &pattern[..star],
            None => pattern,
        };
        let cut = prefix
            .rfind(SEPARATORS)
            .ok_or_else(|| PatternError::MissingSeparator(pattern.to_string()))?;

        // "/*.rs" searches from the filesystem root itself
        if cut == 0 { Ok(&prefix[..1]) } else { Ok(&prefix[..cut]) }
    }
}

/// The `<path>,<opcodes>[,**]` text form of a monitoring request
pub mod request_encoding {
    use super::*;

    pub static REQUEST_PATTERN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?P<path>.+),(?P<ops>[CRUD]+)(?P<subtree>,\*\*)?$")
            .expect("Invalid regex pattern")
    });

    /// Marker appended to directory requests that watch their whole subtree
    pub const SUBTREE_MARKER: &str = "**";

    /// The raw pieces of an encoded request, not yet validated against the filesystem
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct EncodedRequest<'a> {
        pub path: &'a str,
        pub opcodes: &'a str,
        pub watch_subtree: bool,
    }

    /// Split an encoded request into its parts
    pub fn split(text: &str) -> Option<EncodedRequest<'_>> {
        let caps = REQUEST_PATTERN.captures(text.trim())?;
        Some(EncodedRequest {
            path: caps.name("path")?.as_str(),
            opcodes: caps.name("ops")?.as_str(),
            watch_subtree: caps.name("subtree").is_some(),
        })
    }
}
