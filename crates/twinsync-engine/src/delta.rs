//! Delta computation
//!
//! The source side accumulates its delta in the durable event log; the
//! target side has no log, so its delta is re-derived by walking the live
//! tree against the last-serialized shared index. Both end up as change
//! tries so correlation can treat the two sides uniformly.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tracing::{debug, info};
use twinsync_index::{DirectoryEntry, DirectoryIndex};
use twinsync_trie::FileSystemTrie;
use twinsync_types::path::PathMatcher;
use twinsync_types::{
    path, ChangeProperties, Clock, EntryChange, EntryType, Error, Result,
};

/// Build a change trie from an ordered change stream
pub fn build_trie<I>(changes: I, stacking: bool) -> Result<FileSystemTrie>
where
    I: IntoIterator<Item = EntryChange>,
{
    let mut trie = FileSystemTrie::with_stacking(stacking);
    for change in changes {
        trie.add(change)?;
    }
    debug!("built delta trie with {} pending change(s)", trie.count());
    Ok(trie)
}

/// Derive the delta of a live tree against the shared index by walking
/// directory-by-directory.
///
/// - a live entry matched in the index and unchanged (write time and length
///   for files) emits nothing
/// - a changed live file emits `Change` with the live properties
/// - an unmatched live entry emits a synthetic whole-subtree `Create`
/// - an index entry missing from the live tree emits `Delete`, stamped with
///   the last sync time since there is no real observation time
pub async fn tree_delta(
    clock: &dyn Clock,
    live_root: &Path,
    index: &DirectoryIndex,
    last_sync: DateTime<Utc>,
    exclude: &dyn PathMatcher,
) -> Result<Vec<EntryChange>> {
    let mut changes = Vec::new();
    walk(
        clock,
        live_root.to_path_buf(),
        String::new(),
        Some(index.root()),
        last_sync,
        exclude,
        &mut changes,
    )
    .await?;
    info!(
        "tree delta for {}: {} change(s)",
        live_root.display(),
        changes.len()
    );
    Ok(changes)
}

fn walk<'a>(
    clock: &'a dyn Clock,
    live_dir: PathBuf,
    relative: String,
    index_dir: Option<&'a DirectoryEntry>,
    last_sync: DateTime<Utc>,
    exclude: &'a dyn PathMatcher,
    out: &'a mut Vec<EntryChange>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut live_files: Vec<(String, ChangeProperties)> = Vec::new();
        let mut live_dirs: Vec<String> = Vec::new();

        let mut entries = tokio::fs::read_dir(&live_dir).await.map_err(|e| Error::Io {
            message: format!("reading directory '{}': {e}", live_dir.display()),
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::Io {
            message: format!("reading directory entry: {e}"),
        })? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child_relative = path::join(&relative, &name);
            if exclude.is_match(&child_relative) {
                debug!("skipping excluded path: {child_relative}");
                continue;
            }
            let metadata = entry.metadata().await.map_err(|e| Error::Io {
                message: format!("reading metadata for '{child_relative}': {e}"),
            })?;
            let modified = clamp_to_now(clock, metadata.modified().map(DateTime::from).ok());
            if metadata.is_dir() {
                live_dirs.push(name);
            } else {
                live_files.push((name, ChangeProperties::file(modified, metadata.len())));
            }
        }
        live_dirs.sort_unstable();
        live_files.sort_by(|a, b| a.0.cmp(&b.0));

        for name in &live_dirs {
            let child_relative = path::join(&relative, name);
            let child_live = live_dir.join(name);
            match index_dir.and_then(|dir| dir.children().directory(name)) {
                Some(index_sub) => {
                    // Directory timestamps are advisory; the children decide.
                    walk(
                        clock,
                        child_live,
                        child_relative,
                        Some(index_sub),
                        last_sync,
                        exclude,
                        out,
                    )
                    .await?;
                }
                None => {
                    // Newly observed subtree: synthesize creates throughout.
                    let modified = directory_mtime(clock, &child_live).await;
                    out.push(EntryChange::create(
                        clock,
                        Some(modified),
                        &child_relative,
                        EntryType::Directory,
                        Some(ChangeProperties::directory(modified)),
                    )?);
                    walk(clock, child_live, child_relative, None, last_sync, exclude, out)
                        .await?;
                }
            }
        }

        for (name, properties) in &live_files {
            let child_relative = path::join(&relative, name);
            match index_dir.and_then(|dir| dir.children().file(name)) {
                Some(index_file) => {
                    let unchanged = timestamps_equal(
                        index_file.last_write_time(),
                        properties.last_write_time,
                    ) && index_file.length() == properties.length;
                    if !unchanged {
                        out.push(EntryChange::change(
                            clock,
                            Some(properties.last_write_time),
                            &child_relative,
                            *properties,
                        )?);
                    }
                }
                None => {
                    out.push(EntryChange::create(
                        clock,
                        Some(properties.last_write_time),
                        &child_relative,
                        EntryType::File,
                        Some(*properties),
                    )?);
                }
            }
        }

        if let Some(index_dir) = index_dir {
            for index_sub in index_dir.children().directories() {
                if !live_dirs.iter().any(|name| name == index_sub.name()) {
                    let child_relative = path::join(&relative, index_sub.name());
                    if !exclude.is_match(&child_relative) {
                        out.push(EntryChange::delete(
                            clock,
                            Some(last_sync),
                            &child_relative,
                            EntryType::Directory,
                        )?);
                    }
                }
            }
            for index_file in index_dir.children().files() {
                if !live_files.iter().any(|(name, _)| name == index_file.name()) {
                    let child_relative = path::join(&relative, index_file.name());
                    if !exclude.is_match(&child_relative) {
                        out.push(EntryChange::delete(
                            clock,
                            Some(last_sync),
                            &child_relative,
                            EntryType::File,
                        )?);
                    }
                }
            }
        }

        Ok(())
    })
}

/// Compare write times at the millisecond precision the index persists
pub fn timestamps_equal(lhs: DateTime<Utc>, rhs: DateTime<Utc>) -> bool {
    lhs.timestamp_millis() == rhs.timestamp_millis()
}

fn clamp_to_now(clock: &dyn Clock, modified: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = clock.now();
    match modified {
        Some(ts) if ts <= now => ts,
        _ => now,
    }
}

async fn directory_mtime(clock: &dyn Clock, dir: &Path) -> DateTime<Utc> {
    let modified = tokio::fs::metadata(dir)
        .await
        .ok()
        .and_then(|metadata| metadata.modified().ok())
        .map(DateTime::from);
    clamp_to_now(clock, modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use twinsync_types::ManualClock;

    #[derive(Debug)]
    struct AllowAll;
    impl PathMatcher for AllowAll {
        fn is_match(&self, _path: &str) -> bool {
            false
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            chrono::Utc::now() + chrono::Duration::seconds(120),
        ))
    }

    #[tokio::test]
    async fn test_unmatched_live_entries_become_creates() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("new/sub")).unwrap();
        std::fs::write(tmp.path().join("new/sub/a.txt"), b"abc").unwrap();
        let clock = clock();

        let changes = tree_delta(
            clock.as_ref(),
            tmp.path(),
            &DirectoryIndex::new(),
            DateTime::<Utc>::MIN_UTC,
            &AllowAll,
        )
        .await
        .unwrap();

        let summary: Vec<(&str, twinsync_types::EntryAction)> = changes
            .iter()
            .map(|c| (c.old_path(), c.action()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("new", twinsync_types::EntryAction::Create),
                ("new/sub", twinsync_types::EntryAction::Create),
                ("new/sub/a.txt", twinsync_types::EntryAction::Create),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_index_entries_become_deletes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let clock = clock();
        let last_sync = chrono::Utc::now() - chrono::Duration::hours(1);

        // Index knows a file and a directory that are gone on disk.
        let mut index = DirectoryIndex::new();
        index
            .create(
                last_sync,
                "ghost",
                twinsync_index::FileSystemEntry::Directory(DirectoryEntry::new(
                    "ghost", last_sync,
                )),
            )
            .unwrap();
        index
            .create(
                last_sync,
                "gone.txt",
                twinsync_index::FileSystemEntry::File(twinsync_index::FileEntry::new(
                    "gone.txt", last_sync, 9,
                )),
            )
            .unwrap();

        let changes = tree_delta(clock.as_ref(), tmp.path(), &index, last_sync, &AllowAll)
            .await
            .unwrap();

        assert_eq!(changes.len(), 2);
        for change in &changes {
            assert_eq!(change.action(), twinsync_types::EntryAction::Delete);
            assert_eq!(change.timestamp(), Some(last_sync));
        }
    }

    #[tokio::test]
    async fn test_matching_file_with_equal_properties_is_silent() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("same.txt"), b"stable").unwrap();
        let clock = clock();

        let index = DirectoryIndex::from_disk(tmp.path()).unwrap();
        let changes = tree_delta(
            clock.as_ref(),
            tmp.path(),
            &index,
            DateTime::<Utc>::MIN_UTC,
            &AllowAll,
        )
        .await
        .unwrap();

        assert!(changes.is_empty(), "unexpected changes: {changes:?}");
    }

    #[tokio::test]
    async fn test_changed_file_emits_change() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("doc.txt"), b"v1").unwrap();
        let clock = clock();

        let index = DirectoryIndex::from_disk(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("doc.txt"), b"version-two").unwrap();

        let changes = tree_delta(
            clock.as_ref(),
            tmp.path(),
            &index,
            DateTime::<Utc>::MIN_UTC,
            &AllowAll,
        )
        .await
        .unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].action(), twinsync_types::EntryAction::Change);
        assert_eq!(changes[0].change_properties().unwrap().length, 11);
    }

    #[test]
    fn test_build_trie_collapses_stacked_changes() {
        let clock = clock();
        let now = chrono::Utc::now();
        let create = EntryChange::create(
            clock.as_ref(),
            Some(now),
            "tmp.txt",
            EntryType::File,
            Some(ChangeProperties::file(now, 4)),
        )
        .unwrap();
        let delete =
            EntryChange::delete(clock.as_ref(), Some(now), "tmp.txt", EntryType::File).unwrap();

        let trie = build_trie([create, delete], true).unwrap();
        assert!(trie.is_empty());
    }
}
