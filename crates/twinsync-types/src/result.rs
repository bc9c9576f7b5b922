//! Result type alias for TwinSync operations

use crate::Error;

/// Result type alias for TwinSync operations
pub type Result<T> = std::result::Result<T, Error>;
