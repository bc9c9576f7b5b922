//! Fixed-format timestamp codec
//!
//! Timestamps cross the persistence boundary (event log records, index files,
//! sync history) as `yyyyMMddHHmmssfff` text with millisecond precision.

use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// The persisted timestamp layout: `yyyyMMddHHmmssfff`
pub const WIRE_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Render a timestamp in the wire format, truncating to milliseconds
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(WIRE_TIMESTAMP_FORMAT).to_string()
}

/// Parse a wire-format timestamp
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text, WIRE_TIMESTAMP_FORMAT)
        .map_err(|e| Error::validation(format!("bad timestamp '{text}': {e}")))?;
    Ok(naive.and_utc())
}
