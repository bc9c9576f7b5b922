//! Event-to-index mutation and durable recording

use crate::{WatchEvent, WatchEventKind};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};
use twinsync_index::{DirectoryEntry, DirectoryIndex, FileEntry, FileSystemEntry};
use twinsync_store::EventLog;
use twinsync_types::path::PathMatcher;
use twinsync_types::{
    path, ChangeProperties, Clock, EntryChange, EntryType, Error, RenameProperties, Result,
};
use walkdir::WalkDir;

/// Tracks one source root: mirrors live events into an in-memory index and
/// appends the corresponding change records to the durable event log.
#[derive(Debug)]
pub struct SourceManager {
    root: PathBuf,
    index: DirectoryIndex,
    log: EventLog,
    clock: Arc<dyn Clock>,
    exclude: Arc<dyn PathMatcher>,
}

impl SourceManager {
    /// Create a manager over an already-built index mirror
    pub fn new(
        root: impl Into<PathBuf>,
        index: DirectoryIndex,
        log: EventLog,
        clock: Arc<dyn Clock>,
        exclude: Arc<dyn PathMatcher>,
    ) -> Self {
        Self {
            root: root.into(),
            index,
            log,
            clock,
            exclude,
        }
    }

    /// Create a manager whose mirror is snapshotted from the live tree
    pub fn start(
        root: impl Into<PathBuf>,
        log: EventLog,
        clock: Arc<dyn Clock>,
        exclude: Arc<dyn PathMatcher>,
    ) -> Result<Self> {
        let root = root.into();
        let index = DirectoryIndex::from_disk(&root)?;
        Ok(Self::new(root, index, log, clock, exclude))
    }

    /// The live index mirror
    pub fn index(&self) -> &DirectoryIndex {
        &self.index
    }

    /// The tracked root
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Number of change records waiting for the next synchronization run
    pub async fn pending_events(&self) -> Result<usize> {
        self.log.len().await
    }

    /// Process one raw watch event: filter, stamp, mirror, record.
    pub async fn handle_event(&mut self, event: WatchEvent) -> Result<()> {
        if self.exclude.is_match(&event.path) {
            debug!("ignoring excluded path: {}", event.path);
            return Ok(());
        }
        let now = self.clock.now();
        match event.kind {
            WatchEventKind::Created => self.on_created(now, &event).await,
            WatchEventKind::Renamed { ref new_name } => {
                self.on_renamed(now, &event.path, event.entry_type, new_name).await
            }
            WatchEventKind::Changed => self.on_changed(now, &event).await,
            WatchEventKind::Removed => self.on_removed(now, &event).await,
            WatchEventKind::Error { ref message } => {
                warn!("watch subscription error: {message}");
                Ok(())
            }
        }
    }

    async fn on_created(&mut self, now: DateTime<Utc>, event: &WatchEvent) -> Result<()> {
        match event.entry_type {
            EntryType::File => {
                let properties = self.file_properties(&event.path).await?;
                self.record_create(now, &event.path, EntryType::File, Some(properties))
                    .await
            }
            EntryType::Directory => {
                let properties = self.directory_properties(&event.path).await?;
                self.record_create(now, &event.path, EntryType::Directory, Some(properties))
                    .await?;
                // The log must be self-sufficient for rebuilding index
                // state, so a directory create fans out into one create per
                // descendant of the newly-appeared subtree.
                self.record_appeared_subtree(now, &event.path).await
            }
        }
    }

    async fn record_appeared_subtree(&mut self, now: DateTime<Utc>, dir_path: &str) -> Result<()> {
        let absolute = self.absolute(dir_path);
        for entry in WalkDir::new(&absolute).min_depth(1) {
            let entry = entry.map_err(|e| Error::Io {
                message: format!("walking new subtree '{dir_path}': {e}"),
            })?;
            let Ok(suffix) = entry.path().strip_prefix(&absolute) else {
                continue;
            };
            let relative = path::join(dir_path, &suffix.to_string_lossy().replace('\\', "/"));
            if self.exclude.is_match(&relative) {
                continue;
            }
            let metadata = entry.metadata().map_err(|e| Error::Io {
                message: format!("reading metadata for '{relative}': {e}"),
            })?;
            let modified: DateTime<Utc> = metadata.modified().map(DateTime::from).unwrap_or(now);
            let (entry_type, properties) = if metadata.is_dir() {
                (EntryType::Directory, ChangeProperties::directory(modified))
            } else {
                (
                    EntryType::File,
                    ChangeProperties::file(modified, metadata.len()),
                )
            };
            self.record_create(now, &relative, entry_type, Some(properties))
                .await?;
        }
        Ok(())
    }

    async fn record_create(
        &mut self,
        now: DateTime<Utc>,
        relative: &str,
        entry_type: EntryType,
        properties: Option<ChangeProperties>,
    ) -> Result<()> {
        let change = EntryChange::create(
            self.clock.as_ref(),
            Some(now),
            relative,
            entry_type,
            properties,
        )?;
        let entry = match (entry_type, properties) {
            (EntryType::File, Some(props)) => FileSystemEntry::File(FileEntry::new(
                path::basename(relative),
                props.last_write_time,
                props.length,
            )),
            (EntryType::Directory, props) => FileSystemEntry::Directory(DirectoryEntry::new(
                path::basename(relative),
                props.map_or(now, |p| p.last_write_time),
            )),
            (EntryType::File, None) => {
                return Err(Error::invariant("file create without properties"))
            }
        };
        self.index.create(now, relative, entry)?;
        self.log.append(&change).await
    }

    async fn on_renamed(
        &mut self,
        now: DateTime<Utc>,
        relative: &str,
        entry_type: EntryType,
        new_name: &str,
    ) -> Result<()> {
        let change =
            EntryChange::rename(self.clock.as_ref(), Some(now), relative, entry_type, new_name)?;
        self.index
            .rename(now, relative, &RenameProperties::new(new_name))?;
        self.log.append(&change).await
    }

    async fn on_changed(&mut self, now: DateTime<Utc>, event: &WatchEvent) -> Result<()> {
        match event.entry_type {
            EntryType::File => {
                let properties = self.file_properties(&event.path).await?;
                let change =
                    EntryChange::change(self.clock.as_ref(), Some(now), &event.path, properties)?;
                self.index.change(now, &event.path, properties)?;
                self.log.append(&change).await
            }
            EntryType::Directory => {
                // Directories have no Change record; their timestamps bubble
                // at the index level only.
                let properties = self.directory_properties(&event.path).await?;
                self.index.change(now, &event.path, properties)
            }
        }
    }

    async fn on_removed(&mut self, now: DateTime<Utc>, event: &WatchEvent) -> Result<()> {
        let entry_type = self
            .index
            .lookup(&event.path)
            .map_or(event.entry_type, |entry| entry.entry_type());

        let mut deletes = Vec::new();
        if entry_type == EntryType::Directory {
            // Walk the pre-deletion mirror, innermost first, so the log can
            // replay without tripping over already-removed parents.
            if let Some(dir) = self.index.directory_at(&event.path) {
                collect_descendant_deletes(dir, &event.path, &mut deletes);
            }
        }
        deletes.push((event.path.clone(), entry_type));

        for (relative, kind) in &deletes {
            let change = EntryChange::delete(self.clock.as_ref(), Some(now), relative, *kind)?;
            self.log.append(&change).await?;
        }
        self.index.delete(now, &event.path)?;
        Ok(())
    }

    async fn file_properties(&self, relative: &str) -> Result<ChangeProperties> {
        let metadata = tokio::fs::metadata(self.absolute(relative))
            .await
            .map_err(|e| Error::Io {
                message: format!("reading metadata for '{relative}': {e}"),
            })?;
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| self.clock.now());
        Ok(ChangeProperties::file(modified, metadata.len()))
    }

    async fn directory_properties(&self, relative: &str) -> Result<ChangeProperties> {
        let metadata = tokio::fs::metadata(self.absolute(relative))
            .await
            .map_err(|e| Error::Io {
                message: format!("reading metadata for '{relative}': {e}"),
            })?;
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| self.clock.now());
        Ok(ChangeProperties::directory(modified))
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        let mut absolute = self.root.clone();
        for segment in path::segments(relative) {
            absolute.push(segment);
        }
        absolute
    }
}

/// Emit one delete per descendant of `dir`, children before parents.
fn collect_descendant_deletes(
    dir: &DirectoryEntry,
    dir_path: &str,
    out: &mut Vec<(String, EntryType)>,
) {
    for sub in dir.children().directories() {
        let sub_path = path::join(dir_path, sub.name());
        collect_descendant_deletes(sub, &sub_path, out);
        out.push((sub_path, EntryType::Directory));
    }
    for file in dir.children().files() {
        out.push((path::join(dir_path, file.name()), EntryType::File));
    }
}
