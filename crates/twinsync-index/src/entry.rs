//! Snapshot entry nodes

use crate::EntryCollection;
use chrono::{DateTime, Utc};
use twinsync_types::{ChangeProperties, EntryType};

/// Snapshot of one file: name, write time, length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub(crate) name: String,
    pub(crate) last_write_time: DateTime<Utc>,
    pub(crate) length: u64,
}

impl FileEntry {
    /// Create a file entry
    pub fn new(name: impl Into<String>, last_write_time: DateTime<Utc>, length: u64) -> Self {
        Self {
            name: name.into(),
            last_write_time,
            length,
        }
    }

    /// Entry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last write time
    pub fn last_write_time(&self) -> DateTime<Utc> {
        self.last_write_time
    }

    /// Length in bytes
    pub fn length(&self) -> u64 {
        self.length
    }

    /// The content payload this snapshot corresponds to
    pub fn properties(&self) -> ChangeProperties {
        ChangeProperties::file(self.last_write_time, self.length)
    }
}

/// Snapshot of one directory: name, write time, children
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryEntry {
    pub(crate) name: String,
    pub(crate) last_write_time: DateTime<Utc>,
    pub(crate) children: EntryCollection,
}

impl DirectoryEntry {
    /// Create an empty directory entry
    pub fn new(name: impl Into<String>, last_write_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            last_write_time,
            children: EntryCollection::new(),
        }
    }

    /// Entry name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last write time, an aggregate of the whole subtree
    pub fn last_write_time(&self) -> DateTime<Utc> {
        self.last_write_time
    }

    /// Child entries
    pub fn children(&self) -> &EntryCollection {
        &self.children
    }

    /// Mutable child entries
    pub fn children_mut(&mut self) -> &mut EntryCollection {
        &mut self.children
    }

    /// Raise the write time to `timestamp` if it is newer.
    ///
    /// Directory timestamps are a monotonically-updated aggregate of their
    /// subtree, used as a conflict-priority signal.
    pub fn bump_last_write_time(&mut self, timestamp: DateTime<Utc>) {
        if timestamp > self.last_write_time {
            self.last_write_time = timestamp;
        }
    }
}

/// A snapshot entry, file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSystemEntry {
    /// File snapshot
    File(FileEntry),
    /// Directory snapshot
    Directory(DirectoryEntry),
}

impl FileSystemEntry {
    /// Entry kind
    pub fn entry_type(&self) -> EntryType {
        match self {
            Self::File(_) => EntryType::File,
            Self::Directory(_) => EntryType::Directory,
        }
    }

    /// Entry name
    pub fn name(&self) -> &str {
        match self {
            Self::File(file) => file.name(),
            Self::Directory(dir) => dir.name(),
        }
    }

    /// Last write time
    pub fn last_write_time(&self) -> DateTime<Utc> {
        match self {
            Self::File(file) => file.last_write_time(),
            Self::Directory(dir) => dir.last_write_time(),
        }
    }

    /// Length in bytes; zero for directories
    pub fn length(&self) -> u64 {
        match self {
            Self::File(file) => file.length(),
            Self::Directory(_) => 0,
        }
    }

    /// Apply a content payload: write time for both kinds, length for files
    pub fn apply_properties(&mut self, properties: ChangeProperties) {
        match self {
            Self::File(file) => {
                file.last_write_time = properties.last_write_time;
                file.length = properties.length;
            }
            Self::Directory(dir) => {
                dir.last_write_time = properties.last_write_time;
            }
        }
    }

    /// Directory view, if this is a directory
    pub fn as_directory(&self) -> Option<&DirectoryEntry> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::File(_) => None,
        }
    }

    /// Mutable directory view, if this is a directory
    pub fn as_directory_mut(&mut self) -> Option<&mut DirectoryEntry> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::File(_) => None,
        }
    }

    /// File view, if this is a file
    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bump_is_monotonic() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        let mut dir = DirectoryEntry::new("docs", late);
        dir.bump_last_write_time(early);
        assert_eq!(dir.last_write_time(), late);

        let later = late + chrono::Duration::hours(1);
        dir.bump_last_write_time(later);
        assert_eq!(dir.last_write_time(), later);
    }

    #[test]
    fn test_apply_properties_by_kind() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut file = FileSystemEntry::File(FileEntry::new("a.txt", ts, 10));
        file.apply_properties(ChangeProperties::file(ts + chrono::Duration::hours(1), 42));
        assert_eq!(file.length(), 42);

        let mut dir = FileSystemEntry::Directory(DirectoryEntry::new("d", ts));
        dir.apply_properties(ChangeProperties::directory(ts + chrono::Duration::hours(2)));
        assert_eq!(dir.length(), 0);
        assert_eq!(dir.last_write_time(), ts + chrono::Duration::hours(2));
    }
}
