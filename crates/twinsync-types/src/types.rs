//! Core vocabulary types for TwinSync
//!
//! Entry kinds, observed actions, the property payloads attached to changes,
//! and the statistics a synchronization run reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of a file-system entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// Observed action on a file-system entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryAction {
    /// Entry appeared
    Create,
    /// Entry was given a new name
    Rename,
    /// Entry content or metadata changed
    Change,
    /// Entry disappeared
    Delete,
}

impl EntryAction {
    /// Compare two optional actions, treating `None` as the sentinel
    /// "no pending action". Used by conflict classification where one side
    /// of a pairing may be absent.
    pub fn matches(lhs: Option<Self>, rhs: Option<Self>) -> bool {
        lhs == rhs
    }
}

/// New-name payload of a rename; the old name is derived from the path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameProperties {
    /// Name the entry was renamed to
    pub name: String,
}

impl RenameProperties {
    /// Create rename properties for the given target name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}

/// Content payload of a create or change
///
/// Directories only carry `last_write_time`; their `length` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeProperties {
    /// Last write time of the entry
    pub last_write_time: DateTime<Utc>,
    /// Length in bytes; zero for directories
    pub length: u64,
}

impl ChangeProperties {
    /// Properties for a file with the given write time and length
    pub fn file(last_write_time: DateTime<Utc>, length: u64) -> Self {
        Self {
            last_write_time,
            length,
        }
    }

    /// Properties for a directory; length is meaningless and kept at zero
    pub fn directory(last_write_time: DateTime<Utc>) -> Self {
        Self {
            last_write_time,
            length: 0,
        }
    }
}

/// Direction of an applied change relative to the tracked source root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Change observed on the source, applied to the target tree
    SourceToTarget,
    /// Change observed on the target, applied to the source tree
    TargetToSource,
}

/// Statistics reported by a synchronization run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    /// Changes applied to the target tree
    pub applied_to_target: u64,
    /// Changes that failed precondition checks against the target tree
    pub failed_to_target: u64,
    /// Changes applied to the source tree
    pub applied_to_source: u64,
    /// Changes that failed precondition checks against the source tree
    pub failed_to_source: u64,
    /// Conflicts detected during correlation
    pub conflicts: u64,
    /// Total duration of the run
    pub duration: Duration,
}

impl SyncStats {
    /// Create a new empty statistics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome in the given direction
    pub fn record(&mut self, direction: SyncDirection, applied: bool) {
        match (direction, applied) {
            (SyncDirection::SourceToTarget, true) => self.applied_to_target += 1,
            (SyncDirection::SourceToTarget, false) => self.failed_to_target += 1,
            (SyncDirection::TargetToSource, true) => self.applied_to_source += 1,
            (SyncDirection::TargetToSource, false) => self.failed_to_source += 1,
        }
    }

    /// Total applied changes across both directions
    pub fn total_applied(&self) -> u64 {
        self.applied_to_target + self.applied_to_source
    }

    /// Total failed changes across both directions
    pub fn total_failed(&self) -> u64 {
        self.failed_to_target + self.failed_to_source
    }

    /// Merge statistics from another instance
    pub fn merge(&mut self, other: &SyncStats) {
        self.applied_to_target += other.applied_to_target;
        self.failed_to_target += other.failed_to_target;
        self.applied_to_source += other.applied_to_source;
        self.failed_to_source += other.failed_to_source;
        self.conflicts += other.conflicts;
        self.duration += other.duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_properties_directory_length_is_zero() {
        let props = ChangeProperties::directory(Utc::now());
        assert_eq!(props.length, 0);
    }

    #[test]
    fn test_stats_record_directions() {
        let mut stats = SyncStats::new();
        stats.record(SyncDirection::SourceToTarget, true);
        stats.record(SyncDirection::SourceToTarget, false);
        stats.record(SyncDirection::TargetToSource, true);

        assert_eq!(stats.applied_to_target, 1);
        assert_eq!(stats.failed_to_target, 1);
        assert_eq!(stats.applied_to_source, 1);
        assert_eq!(stats.total_applied(), 2);
        assert_eq!(stats.total_failed(), 1);
    }

    #[test]
    fn test_action_sentinel_comparison() {
        assert!(EntryAction::matches(None, None));
        assert!(!EntryAction::matches(Some(EntryAction::Create), None));
        assert!(EntryAction::matches(
            Some(EntryAction::Delete),
            Some(EntryAction::Delete)
        ));
    }
}
