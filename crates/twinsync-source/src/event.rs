//! Watch subscription boundary types

use twinsync_types::EntryType;

/// Kind of a raw file-system notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEventKind {
    /// Entry appeared under the tracked root
    Created,
    /// Entry was renamed within its directory
    Renamed {
        /// Name the entry now carries
        new_name: String,
    },
    /// Entry content or metadata changed
    Changed,
    /// Entry disappeared
    Removed,
    /// The watch subscription reported a problem
    Error {
        /// Subscription error text
        message: String,
    },
}

/// One raw notification from the OS watch subscription.
///
/// Paths are slash-separated and relative to the tracked root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// Relative path the notification refers to
    pub path: String,
    /// Kind of the affected entry
    pub entry_type: EntryType,
    /// What happened
    pub kind: WatchEventKind,
}

impl WatchEvent {
    /// Convenience constructor
    pub fn new(path: impl Into<String>, entry_type: EntryType, kind: WatchEventKind) -> Self {
        Self {
            path: path.into(),
            entry_type,
            kind,
        }
    }
}
