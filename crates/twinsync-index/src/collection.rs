//! Kind-partitioned child collections
//!
//! Children of a snapshot directory live in two insertion-ordered groups
//! (files and directories) with a shared name index. A name maps to at most
//! one entry across both groups. Renames go through an explicit
//! [`EntryCollection::rename_entry`] call so the index never drifts from the
//! entry's own name field.

use crate::{DirectoryEntry, FileEntry, FileSystemEntry};
use std::collections::HashMap;
use twinsync_types::{ChangeProperties, EntryType, Error, Result};

/// Shared view of one collection member
#[derive(Debug, Clone, Copy)]
pub enum EntryRef<'a> {
    /// File member
    File(&'a FileEntry),
    /// Directory member
    Directory(&'a DirectoryEntry),
}

impl EntryRef<'_> {
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
    pub fn last_write_time(&self) -> chrono::DateTime<chrono::Utc> {
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
}

/// Mutable view of one collection member
#[derive(Debug)]
pub enum EntryMut<'a> {
    /// File member
    File(&'a mut FileEntry),
    /// Directory member
    Directory(&'a mut DirectoryEntry),
}

impl EntryMut<'_> {
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
}

/// Insertion-ordered, name-indexed set of child entries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryCollection {
    files: Vec<FileEntry>,
    directories: Vec<DirectoryEntry>,
    by_name: HashMap<String, (EntryType, usize)>,
}

impl EntryCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across both groups
    pub fn len(&self) -> usize {
        self.files.len() + self.directories.len()
    }

    /// Whether the collection has no entries
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.directories.is_empty()
    }

    /// Kind of the entry under `name`, if present
    pub fn entry_type_of(&self, name: &str) -> Option<EntryType> {
        self.by_name.get(name).map(|(kind, _)| *kind)
    }

    /// All file members in insertion order
    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.iter()
    }

    /// All directory members in insertion order
    pub fn directories(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.directories.iter()
    }

    /// File member by name
    pub fn file(&self, name: &str) -> Option<&FileEntry> {
        match self.by_name.get(name) {
            Some((EntryType::File, idx)) => self.files.get(*idx),
            _ => None,
        }
    }

    /// Directory member by name
    pub fn directory(&self, name: &str) -> Option<&DirectoryEntry> {
        match self.by_name.get(name) {
            Some((EntryType::Directory, idx)) => self.directories.get(*idx),
            _ => None,
        }
    }

    /// Mutable directory member by name
    pub fn directory_mut(&mut self, name: &str) -> Option<&mut DirectoryEntry> {
        match self.by_name.get(name) {
            Some((EntryType::Directory, idx)) => self.directories.get_mut(*idx),
            _ => None,
        }
    }

    /// Shared view of the member under `name`, whatever its kind
    pub fn entry(&self, name: &str) -> Option<EntryRef<'_>> {
        match self.by_name.get(name) {
            Some((EntryType::File, idx)) => self.files.get(*idx).map(EntryRef::File),
            Some((EntryType::Directory, idx)) => {
                self.directories.get(*idx).map(EntryRef::Directory)
            }
            None => None,
        }
    }

    /// Mutable view of the member under `name`, whatever its kind
    pub fn entry_mut(&mut self, name: &str) -> Option<EntryMut<'_>> {
        match self.by_name.get(name) {
            Some((EntryType::File, idx)) => self.files.get_mut(*idx).map(EntryMut::File),
            Some((EntryType::Directory, idx)) => {
                self.directories.get_mut(*idx).map(EntryMut::Directory)
            }
            None => None,
        }
    }

    /// Insert a new member.
    ///
    /// A same-type entry already holding the name is an attempted duplicate
    /// create and fails. An opposite-type entry is replaced and returned;
    /// callers guard this per synchronization semantics.
    pub fn insert(&mut self, entry: FileSystemEntry) -> Result<Option<FileSystemEntry>> {
        let name = entry.name().to_string();
        let replaced = match self.by_name.get(&name) {
            Some((kind, _)) if *kind == entry.entry_type() => {
                return Err(Error::validation(format!(
                    "duplicate create of '{name}': an entry of the same type already exists"
                )));
            }
            Some(_) => self.remove(&name),
            None => None,
        };

        match entry {
            FileSystemEntry::File(file) => {
                self.by_name
                    .insert(name, (EntryType::File, self.files.len()));
                self.files.push(file);
            }
            FileSystemEntry::Directory(dir) => {
                self.by_name
                    .insert(name, (EntryType::Directory, self.directories.len()));
                self.directories.push(dir);
            }
        }
        Ok(replaced)
    }

    /// Remove and return the member under `name`
    pub fn remove(&mut self, name: &str) -> Option<FileSystemEntry> {
        let (kind, idx) = self.by_name.remove(name)?;
        let removed = match kind {
            EntryType::File => FileSystemEntry::File(self.files.remove(idx)),
            EntryType::Directory => FileSystemEntry::Directory(self.directories.remove(idx)),
        };
        // Later members of the same group shifted down by one.
        for slot in self.by_name.values_mut() {
            if slot.0 == kind && slot.1 > idx {
                slot.1 -= 1;
            }
        }
        Some(removed)
    }

    /// Rename the member under `old_name` to `new_name`, repointing the
    /// name index in the same step.
    pub fn rename_entry(&mut self, old_name: &str, new_name: &str) -> Result<()> {
        if self.by_name.contains_key(new_name) {
            return Err(Error::validation(format!(
                "cannot rename '{old_name}' to '{new_name}': name already taken"
            )));
        }
        let Some(slot) = self.by_name.remove(old_name) else {
            return Err(Error::not_found(old_name));
        };
        match slot {
            (EntryType::File, idx) => self.files[idx].name = new_name.to_string(),
            (EntryType::Directory, idx) => self.directories[idx].name = new_name.to_string(),
        }
        self.by_name.insert(new_name.to_string(), slot);
        Ok(())
    }
}
