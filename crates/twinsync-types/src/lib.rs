//! Core type system and error handling for TwinSync
//!
//! This crate provides the foundational types shared by every TwinSync crate:
//!
//! - **Error handling**: Structured error types with a fatality classifier
//! - **Change model**: Validated [`EntryChange`] and [`EntryCommand`] values
//! - **Clock**: An injectable clock abstraction for deterministic tests
//! - **Timestamps**: The fixed `yyyyMMddHHmmssfff` wire codec
//!
//! # Examples
//!
//! ```rust
//! use twinsync_types::{Clock, EntryChange, EntryType, SystemClock};
//!
//! let clock = SystemClock;
//! let change = EntryChange::delete(&clock, Some(clock.now()), "docs/old.txt", EntryType::File)?;
//! assert_eq!(change.name(), "old.txt");
//! # Ok::<(), twinsync_types::Error>(())
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod change;
pub mod clock;
pub mod command;
pub mod error;
pub mod path;
pub mod result;
pub mod timestamp;
pub mod types;

// Re-export commonly used types
pub use change::EntryChange;
pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{CommandAction, EntryCommand};
pub use error::{Error, ErrorKind};
pub use result::Result;
pub use timestamp::{format_timestamp, parse_timestamp, WIRE_TIMESTAMP_FORMAT};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_stats_merge() {
        let mut stats1 = SyncStats::new();
        stats1.applied_to_target = 5;
        stats1.failed_to_target = 1;

        let mut stats2 = SyncStats::new();
        stats2.applied_to_target = 3;
        stats2.applied_to_source = 2;

        stats1.merge(&stats2);
        assert_eq!(stats1.applied_to_target, 8);
        assert_eq!(stats1.failed_to_target, 1);
        assert_eq!(stats1.applied_to_source, 2);
    }

    #[test]
    fn test_error_fatality() {
        let invariant = Error::invariant("count went negative");
        assert!(invariant.is_fatal());

        let precondition = Error::precondition("target already exists");
        assert!(!precondition.is_fatal());
    }
}
