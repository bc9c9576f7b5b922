//! Exclude-pattern matching
//!
//! User patterns come from a newline-delimited file in gitignore syntax
//! (blank lines and `#` comments are skipped by the format itself). The
//! service-metadata folder is excluded unconditionally, independent of any
//! pattern content.

use crate::{ConfigError, ConfigResult};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;
use tracing::debug;
use twinsync_types::path::{self, PathMatcher};

/// Compiled exclude patterns plus the fixed service-folder exclusion
#[derive(Debug)]
pub struct ExcludeMatcher {
    patterns: Gitignore,
    service_dir: String,
}

impl ExcludeMatcher {
    /// Build a matcher from pattern lines
    pub fn from_patterns<I, S>(service_dir: &str, patterns: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GitignoreBuilder::new("");
        for line in patterns {
            builder
                .add_line(None, line.as_ref())
                .map_err(|e| ConfigError::Pattern {
                    message: e.to_string(),
                })?;
        }
        let patterns = builder.build().map_err(|e| ConfigError::Pattern {
            message: e.to_string(),
        })?;
        Ok(Self {
            patterns,
            service_dir: service_dir.to_string(),
        })
    }

    /// Build a matcher from a pattern file; a missing file means no user
    /// patterns, only the fixed service-folder exclusion.
    pub fn from_file(service_dir: &str, pattern_file: Option<&Path>) -> ConfigResult<Self> {
        let Some(pattern_file) = pattern_file else {
            return Self::from_patterns(service_dir, std::iter::empty::<&str>());
        };
        let text = match std::fs::read_to_string(pattern_file) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: pattern_file.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        debug!(
            "loaded {} exclude pattern line(s) from {}",
            text.lines().count(),
            pattern_file.display()
        );
        Self::from_patterns(service_dir, text.lines())
    }

    /// Matcher with no user patterns
    pub fn service_only(service_dir: &str) -> Self {
        Self {
            patterns: Gitignore::empty(),
            service_dir: service_dir.to_string(),
        }
    }
}

impl PathMatcher for ExcludeMatcher {
    fn is_match(&self, relative_path: &str) -> bool {
        if path::segments(relative_path).next() == Some(self.service_dir.as_str()) {
            return true;
        }
        self.patterns
            .matched_path_or_any_parents(relative_path, false)
            .is_ignore()
            || self
                .patterns
                .matched_path_or_any_parents(relative_path, true)
                .is_ignore()
    }
}
