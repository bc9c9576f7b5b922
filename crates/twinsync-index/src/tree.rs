//! The index tree and its point mutations
//!
//! [`DirectoryIndex`] mirrors a tracked root's structure in memory. Every
//! mutation is addressed by a slash-separated relative path, walks from the
//! synthetic root to the parent directory, mutates the named child, and
//! bubbles the operation timestamp up every ancestor on the way back out.

use crate::{DirectoryEntry, EntryRef, FileEntry, FileSystemEntry};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::{debug, trace};
use twinsync_types::{
    path, ChangeProperties, EntryAction, EntryChange, EntryType, Error, RenameProperties, Result,
};
use twinsync_types::path::PathMatcher;

/// In-memory snapshot of a tracked directory tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryIndex {
    root: DirectoryEntry,
}

impl DirectoryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// The synthetic root directory
    pub fn root(&self) -> &DirectoryEntry {
        &self.root
    }

    pub(crate) fn from_root(root: DirectoryEntry) -> Self {
        Self { root }
    }

    /// Snapshot a live directory tree from disk.
    ///
    /// Children are recorded in name order so two snapshots of equal trees
    /// serialize identically. Directory write times aggregate their subtree.
    pub fn from_disk(root_path: &Path) -> Result<Self> {
        if !root_path.is_dir() {
            return Err(Error::PathNotFound {
                path: root_path.to_path_buf(),
            });
        }
        let root = snapshot_directory(root_path, String::new())?;
        Ok(Self { root })
    }

    /// Look up the entry at `relative_path`
    pub fn lookup(&self, relative_path: &str) -> Option<EntryRef<'_>> {
        let segments: Vec<&str> = path::segments(relative_path).collect();
        let (leaf, ancestors) = segments.split_last()?;
        let mut dir = &self.root;
        for segment in ancestors {
            dir = dir.children().directory(segment)?;
        }
        dir.children().entry(leaf)
    }

    /// Directory entry at `relative_path`; the empty path is the root
    pub fn directory_at(&self, relative_path: &str) -> Option<&DirectoryEntry> {
        let mut dir = &self.root;
        for segment in path::segments(relative_path) {
            dir = dir.children().directory(segment)?;
        }
        Some(dir)
    }

    /// Insert `new_entry` as a child of the directory at `dirname(path)`,
    /// bubbling `timestamp` up all ancestors.
    pub fn create(
        &mut self,
        timestamp: DateTime<Utc>,
        relative_path: &str,
        new_entry: FileSystemEntry,
    ) -> Result<()> {
        if new_entry.name() != path::basename(relative_path) {
            return Err(Error::validation(format!(
                "entry name '{}' does not match created path '{relative_path}'",
                new_entry.name()
            )));
        }
        trace!("index create: {relative_path}");
        self.with_parent(timestamp, relative_path, move |dir, _name| {
            dir.children_mut().insert(new_entry).map(|_| ())
        })
    }

    /// Rename the entry at `relative_path`, bubbling `timestamp`
    pub fn rename(
        &mut self,
        timestamp: DateTime<Utc>,
        relative_path: &str,
        properties: &RenameProperties,
    ) -> Result<()> {
        trace!("index rename: {relative_path} -> {}", properties.name);
        let new_name = properties.name.clone();
        self.with_parent(timestamp, relative_path, move |dir, name| {
            dir.children_mut().rename_entry(name, &new_name)
        })
    }

    /// Update the content payload of the entry at `relative_path`,
    /// bubbling `timestamp`
    pub fn change(
        &mut self,
        timestamp: DateTime<Utc>,
        relative_path: &str,
        properties: ChangeProperties,
    ) -> Result<()> {
        trace!("index change: {relative_path}");
        let owned = relative_path.to_string();
        self.with_parent(timestamp, relative_path, move |dir, name| {
            let Some(mut entry) = dir.children_mut().entry_mut(name) else {
                return Err(Error::not_found(owned));
            };
            entry.apply_properties(properties);
            Ok(())
        })
    }

    /// Remove the entry at `relative_path`, bubbling `timestamp` to its
    /// former ancestors
    pub fn delete(&mut self, timestamp: DateTime<Utc>, relative_path: &str) -> Result<()> {
        trace!("index delete: {relative_path}");
        let owned = relative_path.to_string();
        self.with_parent(timestamp, relative_path, move |dir, name| {
            dir.children_mut()
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| Error::not_found(owned))
        })
    }

    /// Apply an ordered sequence of changes via the four primitives,
    /// skipping paths matched by `exclude`.
    ///
    /// This is how the local index catches up after a set of net changes
    /// has been decided.
    pub fn merge_changes<'a, I>(
        &mut self,
        changes: I,
        exclude: Option<&dyn PathMatcher>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = &'a EntryChange>,
    {
        for change in changes {
            if let Some(matcher) = exclude {
                if matcher.is_match(change.old_path()) {
                    debug!("skipping excluded change: {}", change.old_path());
                    continue;
                }
            }
            self.apply_change(change)?;
        }
        Ok(())
    }

    fn apply_change(&mut self, change: &EntryChange) -> Result<()> {
        let timestamp = change.timestamp().unwrap_or(DateTime::<Utc>::MIN_UTC);
        match change.action() {
            EntryAction::Create => {
                let entry = entry_from_create(change);
                self.create(timestamp, change.old_path(), entry)
            }
            EntryAction::Rename => {
                let properties = change
                    .rename_properties()
                    .ok_or_else(|| Error::invariant("rename change without properties"))?;
                self.rename(timestamp, change.old_path(), properties)
            }
            EntryAction::Change => {
                let properties = change
                    .change_properties()
                    .ok_or_else(|| Error::invariant("change record without properties"))?;
                self.change(timestamp, change.old_path(), properties)
            }
            EntryAction::Delete => self.delete(timestamp, change.old_path()),
        }
    }

    /// Walk to the parent directory of `relative_path`, run `op` against it
    /// with the leaf name, and bump every directory on the walk (the parent
    /// included) to `timestamp` while unwinding.
    fn with_parent<F>(&mut self, timestamp: DateTime<Utc>, relative_path: &str, op: F) -> Result<()>
    where
        F: FnOnce(&mut DirectoryEntry, &str) -> Result<()>,
    {
        let segments: Vec<&str> = path::segments(relative_path).collect();
        if segments.is_empty() {
            return Err(Error::validation("empty path addresses the root itself"));
        }
        walk_and_apply(&mut self.root, &segments, timestamp, relative_path, op)
    }
}

fn walk_and_apply<F>(
    dir: &mut DirectoryEntry,
    segments: &[&str],
    timestamp: DateTime<Utc>,
    full_path: &str,
    op: F,
) -> Result<()>
where
    F: FnOnce(&mut DirectoryEntry, &str) -> Result<()>,
{
    if let [leaf] = segments {
        op(dir, leaf)?;
    } else {
        let child = dir
            .children_mut()
            .directory_mut(segments[0])
            .ok_or_else(|| Error::not_found(full_path))?;
        walk_and_apply(child, &segments[1..], timestamp, full_path, op)?;
    }
    dir.bump_last_write_time(timestamp);
    Ok(())
}

fn entry_from_create(change: &EntryChange) -> FileSystemEntry {
    let name = change.name().to_string();
    match change.entry_type() {
        EntryType::File => {
            let properties = change
                .change_properties()
                .unwrap_or(ChangeProperties::file(DateTime::<Utc>::MIN_UTC, 0));
            FileSystemEntry::File(FileEntry::new(
                name,
                properties.last_write_time,
                properties.length,
            ))
        }
        EntryType::Directory => {
            let last_write_time = change
                .change_properties()
                .map_or_else(
                    || change.timestamp().unwrap_or(DateTime::<Utc>::MIN_UTC),
                    |props| props.last_write_time,
                );
            FileSystemEntry::Directory(DirectoryEntry::new(name, last_write_time))
        }
    }
}

fn snapshot_directory(dir_path: &Path, name: String) -> Result<DirectoryEntry> {
    let metadata = std::fs::metadata(dir_path)?;
    let own_time: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or_default();
    let mut dir = DirectoryEntry::new(name, own_time);

    let mut entries: Vec<std::fs::DirEntry> =
        std::fs::read_dir(dir_path)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let entry_name = entry.file_name().to_string_lossy().into_owned();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            let child = snapshot_directory(&entry.path(), entry_name)?;
            dir.bump_last_write_time(child.last_write_time());
            dir.children_mut()
                .insert(FileSystemEntry::Directory(child))?;
        } else {
            let modified: DateTime<Utc> =
                metadata.modified().map(DateTime::from).unwrap_or_default();
            dir.bump_last_write_time(modified);
            dir.children_mut().insert(FileSystemEntry::File(FileEntry::new(
                entry_name,
                modified,
                metadata.len(),
            )))?;
        }
    }
    Ok(dir)
}
