//! Configuration management for TwinSync
//!
//! Configuration is a single TOML file naming the two roots plus a handful
//! of behavior knobs, an optional newline-delimited exclude-pattern file,
//! and the fixed layout of the per-root service folder where the index,
//! event log, and sync history live.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod exclude;
pub mod layout;

pub use error::{ConfigError, ConfigResult};
pub use exclude::ExcludeMatcher;
pub use layout::ServiceLayout;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default name of the per-root service-metadata folder
pub const DEFAULT_SERVICE_DIR: &str = ".twinsync";

/// Main configuration for a tracked root pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root whose live events are tracked
    pub source_root: PathBuf,
    /// Root reconciled against the source at sync time
    pub target_root: PathBuf,
    /// Service folder settings
    #[serde(default)]
    pub service: ServiceConfig,
    /// Synchronization behavior settings
    #[serde(default)]
    pub sync: SyncConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if self.source_root == self.target_root {
            return Err(ConfigError::Validation {
                message: "source and target roots must differ".to_string(),
            });
        }
        if self.service.dir_name.is_empty() || self.service.dir_name.contains('/') {
            return Err(ConfigError::Validation {
                message: format!("bad service folder name '{}'", self.service.dir_name),
            });
        }
        Ok(())
    }

    /// Service layout for the source root
    pub fn source_layout(&self) -> ServiceLayout {
        ServiceLayout::new(&self.source_root, &self.service.dir_name)
    }

    /// Service layout for the target root
    pub fn target_layout(&self) -> ServiceLayout {
        ServiceLayout::new(&self.target_root, &self.service.dir_name)
    }
}

/// Service folder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Name of the service-metadata folder under each root
    pub dir_name: String,
    /// Optional path to a newline-delimited exclude-pattern file
    pub exclude_file: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            dir_name: DEFAULT_SERVICE_DIR.to_string(),
            exclude_file: None,
        }
    }
}

/// Synchronization behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether a second pending change for a path is merged through the
    /// stacking table instead of failing
    pub stacking: bool,
    /// Report what would be applied without touching either tree
    pub dry_run: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stacking: true,
            dry_run: false,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Env-filter directive for the tracing subscriber
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_minimal_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("twinsync.toml");
        std::fs::write(
            &path,
            "source_root = \"/data/a\"\ntarget_root = \"/data/b\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.source_root, PathBuf::from("/data/a"));
        assert_eq!(config.service.dir_name, DEFAULT_SERVICE_DIR);
        assert!(config.sync.stacking);
        assert!(!config.sync.dry_run);
    }

    #[test]
    fn test_equal_roots_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("twinsync.toml");
        std::fs::write(
            &path,
            "source_root = \"/data/a\"\ntarget_root = \"/data/a\"\n",
        )
        .unwrap();

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/twinsync.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
