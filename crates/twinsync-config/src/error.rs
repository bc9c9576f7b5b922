//! Configuration error types

use std::path::PathBuf;

/// Errors raised while loading or validating configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The configuration or pattern file could not be read
    #[error("cannot read '{path}': {message}")]
    Io {
        /// File that failed to read
        path: PathBuf,
        /// Underlying I/O message
        message: String,
    },

    /// The configuration file is not valid TOML for the expected schema
    #[error("cannot parse '{path}': {message}")]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// A pattern line could not be compiled
    #[error("bad exclude pattern: {message}")]
    Pattern {
        /// Builder message
        message: String,
    },

    /// The configuration values are inconsistent
    #[error("invalid configuration: {message}")]
    Validation {
        /// Description of the inconsistency
        message: String,
    },
}

/// Result alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for twinsync_types::Error {
    fn from(error: ConfigError) -> Self {
        Self::config(error.to_string())
    }
}
