//! Error types and handling for TwinSync
//!
//! The taxonomy follows the way errors are consumed during a synchronization
//! run: validation and invariant errors abort the run, precondition failures
//! are recorded per change and retried on the next cycle, and I/O and store
//! errors carry enough context to distinguish "first run" from corruption.

use std::path::PathBuf;

/// Main error type for TwinSync operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed value construction (bad property combination, identity
    /// rename, future timestamp)
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the rejected construction
        message: String,
    },

    /// A trie or index operation violated a structural invariant; indicates
    /// an upstream tracking bug and is fatal to the current run
    #[error("Invariant violation: {message}")]
    Invariant {
        /// Description of the violated invariant
        message: String,
    },

    /// A (type, action) pairing outside the legal conflict table was
    /// observed; structurally unreachable unless the tries are inconsistent
    #[error("Invalid conflict: {message}")]
    InvalidConflict {
        /// Description of the impossible pairing
        message: String,
    },

    /// An apply-time precondition no longer holds; the change is recorded
    /// as failed and re-derived on the next run
    #[error("Precondition failed: {message}")]
    Precondition {
        /// Description of the failed precondition
        message: String,
    },

    /// A path segment was missing or of the wrong kind in the index tree
    #[error("Entry not found: {path}")]
    NotFound {
        /// Relative path that failed to resolve
        path: String,
    },

    /// The serialized index text was malformed
    #[error("Index format error: {message}")]
    IndexFormat {
        /// Description of the format violation
        message: String,
    },

    /// The durable event log or history record could not be read or written
    #[error("Store error: {message}")]
    Store {
        /// Description of the store failure
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration issue
        message: String,
    },

    /// A required file or directory is missing on disk
    #[error("Path not found: {path}")]
    PathNotFound {
        /// Physical path that was not found
        path: PathBuf,
    },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Value construction errors
    Validation,
    /// Structural invariant violations
    Invariant,
    /// Conflict-classification errors
    InvalidConflict,
    /// Apply-time precondition failures
    Precondition,
    /// Index lookup and format errors
    Index,
    /// Event log and history errors
    Store,
    /// Configuration errors
    Config,
    /// I/O related errors
    Io,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Invariant { .. } => ErrorKind::Invariant,
            Self::InvalidConflict { .. } => ErrorKind::InvalidConflict,
            Self::Precondition { .. } => ErrorKind::Precondition,
            Self::NotFound { .. } | Self::IndexFormat { .. } => ErrorKind::Index,
            Self::Store { .. } => ErrorKind::Store,
            Self::Config { .. } => ErrorKind::Config,
            Self::PathNotFound { .. } | Self::Io { .. } => ErrorKind::Io,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Whether this error aborts the whole synchronization run.
    ///
    /// Invariant and conflict-classification errors mean the tries are
    /// inconsistent and further processing is meaningless. Everything else
    /// is scoped to a single change or surfaced to the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Invariant { .. } | Self::InvalidConflict { .. }
        )
    }

    /// Whether this error is recorded per change and retried next cycle
    pub fn is_per_change(&self) -> bool {
        matches!(self, Self::Precondition { .. } | Self::Io { .. })
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new invariant violation error
    pub fn invariant<S: Into<String>>(message: S) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Create a new invalid-conflict error
    pub fn invalid_conflict<S: Into<String>>(message: S) -> Self {
        Self::InvalidConflict {
            message: message.into(),
        }
    }

    /// Create a new precondition failure
    pub fn precondition<S: Into<String>>(message: S) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Create a new not-found error for a relative index path
    pub fn not_found<S: Into<String>>(path: S) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a new index format error
    pub fn index_format<S: Into<String>>(message: S) -> Self {
        Self::IndexFormat {
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
