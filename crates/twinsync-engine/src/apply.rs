//! Physical application of a directional plan
//!
//! A directional plan is a change trie (observations relayed from the other
//! side) plus the resolved actions conflict resolution produced. Application
//! is phased so dependencies always exist when an operation runs: creates go
//! top-down, deletes bottom-up, and renames run strictly after any
//! co-located non-rename change so nothing references a stale name. Resolved
//! actions run between the content and delete phases, in the order
//! resolution emitted them.
//!
//! Every operation checks its preconditions against the live trees before
//! mutating. A failed precondition marks that one change as failed and moves
//! on; the next run re-derives the path from a fresh delta. Parent directory
//! write times are captured before and restored after each operation, since
//! they are a deliberate signal and not filesystem noise.

use crate::conflict::ResolvedAction;
use crate::delta::timestamps_equal;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use twinsync_trie::FileSystemTrie;
use twinsync_types::{
    path, ChangeProperties, Clock, CommandAction, EntryAction, EntryChange, EntryType, Error,
    Result,
};

/// Everything one direction of a run wants to do to a tree
#[derive(Debug)]
pub struct DirectionPlan {
    /// Relayed observations, aggregated back into a trie
    pub trie: FileSystemTrie,
    /// Conflict-resolution actions, in emission order
    pub actions: Vec<ResolvedAction>,
}

impl DirectionPlan {
    /// Aggregate relayed changes and resolved actions into a plan
    pub fn build(changes: Vec<EntryChange>, actions: Vec<ResolvedAction>) -> Result<Self> {
        let mut trie = FileSystemTrie::new();
        for change in changes {
            trie.add(change)?;
        }
        Ok(Self { trie, actions })
    }

    /// Number of pending operations
    pub fn len(&self) -> usize {
        self.trie.count() as usize + self.actions.len()
    }

    /// Whether there is nothing to do
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What actually happened while applying a plan
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    /// Relayed changes that applied cleanly, in merge order
    pub applied: Vec<EntryChange>,
    /// Resolved actions that applied cleanly
    pub actions_applied: u64,
    /// Paths that failed preconditions, with the reason
    pub failed: Vec<(String, String)>,
}

/// Apply `plan` to the tree at `to_root`, copying content from `from_root`
/// where an operation needs it.
pub async fn apply_plan(
    clock: &dyn Clock,
    from_root: &Path,
    to_root: &Path,
    plan: &DirectionPlan,
    dry_run: bool,
) -> Result<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();
    let applier = Applier {
        clock,
        from_root,
        to_root,
        dry_run,
    };

    // Phase 1: creates, parents before children.
    for depth in 1..=plan.trie.max_depth() {
        for id in plan.trie.level(depth) {
            let node = plan.trie.node(id);
            if let Some(value) = node.value() {
                if value.action() == EntryAction::Create {
                    applier.run_op(&mut outcome, value, applier.create(value)).await?;
                }
            }
        }
    }

    // Phase 2: content changes, addressed by pre-rename paths.
    for depth in 1..=plan.trie.max_depth() {
        for id in plan.trie.level(depth) {
            let node = plan.trie.node(id);
            if let Some(value) = node.value() {
                if value.action() == EntryAction::Change {
                    applier.run_op(&mut outcome, value, applier.change(value)).await?;
                }
            }
        }
    }

    // Phase 3: resolved actions, in resolution order.
    for action in &plan.actions {
        applier.run_action(&mut outcome, action).await?;
    }

    // Phase 4: deletes, children before parents.
    for depth in (1..=plan.trie.max_depth()).rev() {
        for id in plan.trie.level(depth) {
            let node = plan.trie.node(id);
            if let Some(value) = node.value() {
                if value.action() == EntryAction::Delete {
                    applier.run_op(&mut outcome, value, applier.delete(value)).await?;
                }
            }
        }
    }

    // Phase 5: renames, always after any co-located non-rename change.
    for depth in (1..=plan.trie.max_depth()).rev() {
        for id in plan.trie.level(depth) {
            let node = plan.trie.node(id);
            let Some(value) = node.value() else { continue };
            match value.action() {
                EntryAction::Rename => {
                    applier.run_op(&mut outcome, value, applier.rename(value)).await?;
                }
                EntryAction::Change if node.has_pending_rename() => {
                    let rename = EntryChange::rename(
                        clock,
                        value.timestamp(),
                        node.old_path(),
                        node.entry_type(),
                        node.name(),
                    )?;
                    applier.run_op(&mut outcome, &rename, applier.rename(&rename)).await?;
                }
                _ => {}
            }
        }
    }

    Ok(outcome)
}

struct Applier<'a> {
    clock: &'a dyn Clock,
    from_root: &'a Path,
    to_root: &'a Path,
    dry_run: bool,
}

impl Applier<'_> {
    async fn run_op(
        &self,
        outcome: &mut ApplyOutcome,
        change: &EntryChange,
        op: impl std::future::Future<Output = Result<()>>,
    ) -> Result<()> {
        match op.await {
            Ok(()) => {
                outcome.applied.push(change.clone());
                Ok(())
            }
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                warn!("change at '{}' failed: {error}", change.old_path());
                outcome
                    .failed
                    .push((change.old_path().to_string(), error.to_string()));
                Ok(())
            }
        }
    }

    async fn run_action(&self, outcome: &mut ApplyOutcome, action: &ResolvedAction) -> Result<()> {
        let described = match action {
            ResolvedAction::Command(command) => command.path().to_string(),
            ResolvedAction::CrossCopy { to, .. } => to.clone(),
        };
        let result = match action {
            ResolvedAction::Command(command) => match command.action() {
                CommandAction::Copy => self.copy_entry(command.path(), command.path(), false).await,
                CommandAction::CopyWithOverwrite => {
                    self.copy_entry(command.path(), command.path(), true).await
                }
                CommandAction::Delete => self.delete_path(command.path()).await,
                CommandAction::Rename => {
                    let properties = command
                        .rename_properties()
                        .ok_or_else(|| Error::invariant("rename command without properties"))?;
                    self.rename_path(command.path(), &properties.name).await
                }
            },
            ResolvedAction::CrossCopy {
                from,
                to,
                overwrite,
            } => self.copy_entry(from, to, *overwrite).await,
        };
        match result {
            Ok(()) => {
                outcome.actions_applied += 1;
                Ok(())
            }
            Err(error) if error.is_fatal() => Err(error),
            Err(error) => {
                warn!("resolved action at '{described}' failed: {error}");
                outcome.failed.push((described, error.to_string()));
                Ok(())
            }
        }
    }

    async fn create(&self, change: &EntryChange) -> Result<()> {
        let relative = change.path();
        let from = absolute(self.from_root, &relative);
        let to = absolute(self.to_root, &relative);

        if try_metadata(&to).await?.is_some() {
            return Err(Error::precondition(format!(
                "'{relative}' already exists on the receiving tree"
            )));
        }
        match change.entry_type() {
            EntryType::File => {
                let properties = change
                    .change_properties()
                    .ok_or_else(|| Error::invariant("file create without properties"))?;
                self.check_source_file(&from, &relative, properties).await?;
                if self.dry_run {
                    return Ok(());
                }
                let guard = ParentMtime::capture(self.to_root, &relative).await;
                copy_file(&from, &to, properties.last_write_time).await?;
                guard.restore().await;
            }
            EntryType::Directory => {
                if !matches!(try_metadata(&from).await?, Some(m) if m.is_dir()) {
                    return Err(Error::precondition(format!(
                        "'{relative}' is not a directory on the providing tree"
                    )));
                }
                if self.dry_run {
                    return Ok(());
                }
                let guard = ParentMtime::capture(self.to_root, &relative).await;
                tokio::fs::create_dir(&to).await.map_err(|e| Error::Io {
                    message: format!("creating directory '{relative}': {e}"),
                })?;
                if let Some(properties) = change.change_properties() {
                    set_mtime(&to, properties.last_write_time);
                }
                guard.restore().await;
            }
        }
        debug!("applied create: {relative}");
        Ok(())
    }

    async fn change(&self, change: &EntryChange) -> Result<()> {
        let relative = change.old_path().to_string();
        let from = absolute(self.from_root, &relative);
        let to = absolute(self.to_root, &relative);
        let properties = change
            .change_properties()
            .ok_or_else(|| Error::invariant("change record without properties"))?;

        self.check_source_file(&from, &relative, properties).await?;
        if !matches!(try_metadata(&to).await?, Some(m) if m.is_file()) {
            return Err(Error::precondition(format!(
                "'{relative}' is missing on the receiving tree"
            )));
        }
        if self.dry_run {
            return Ok(());
        }
        let guard = ParentMtime::capture(self.to_root, &relative).await;
        copy_file(&from, &to, properties.last_write_time).await?;
        guard.restore().await;
        debug!("applied change: {relative}");
        Ok(())
    }

    async fn delete(&self, change: &EntryChange) -> Result<()> {
        self.delete_path(change.old_path()).await
    }

    async fn delete_path(&self, relative: &str) -> Result<()> {
        let to = absolute(self.to_root, relative);
        let Some(metadata) = try_metadata(&to).await? else {
            return Err(Error::precondition(format!(
                "'{relative}' is already gone on the receiving tree"
            )));
        };
        if self.dry_run {
            return Ok(());
        }
        let guard = ParentMtime::capture(self.to_root, relative).await;
        if metadata.is_dir() {
            tokio::fs::remove_dir_all(&to).await.map_err(|e| Error::Io {
                message: format!("deleting directory '{relative}': {e}"),
            })?;
        } else {
            tokio::fs::remove_file(&to).await.map_err(|e| Error::Io {
                message: format!("deleting file '{relative}': {e}"),
            })?;
        }
        guard.restore().await;
        debug!("applied delete: {relative}");
        Ok(())
    }

    async fn rename(&self, change: &EntryChange) -> Result<()> {
        let new_name = change
            .rename_properties()
            .ok_or_else(|| Error::invariant("rename change without properties"))?;
        self.rename_path(change.old_path(), &new_name.name).await
    }

    async fn rename_path(&self, old_relative: &str, new_name: &str) -> Result<()> {
        let new_relative = path::with_basename(old_relative, new_name);
        let from = absolute(self.to_root, old_relative);
        let to = absolute(self.to_root, &new_relative);

        if try_metadata(&from).await?.is_none() {
            return Err(Error::precondition(format!(
                "'{old_relative}' is missing on the receiving tree"
            )));
        }
        if try_metadata(&to).await?.is_some() {
            return Err(Error::precondition(format!(
                "'{new_relative}' already exists on the receiving tree"
            )));
        }
        if self.dry_run {
            return Ok(());
        }
        let guard = ParentMtime::capture(self.to_root, old_relative).await;
        tokio::fs::rename(&from, &to).await.map_err(|e| Error::Io {
            message: format!("renaming '{old_relative}' to '{new_relative}': {e}"),
        })?;
        guard.restore().await;
        debug!("applied rename: {old_relative} -> {new_relative}");
        Ok(())
    }

    /// Copy one entry from `from_rel` on the providing tree to `to_rel` on
    /// the receiving tree; directories copy recursively.
    async fn copy_entry(&self, from_rel: &str, to_rel: &str, overwrite: bool) -> Result<()> {
        let from = absolute(self.from_root, from_rel);
        let to = absolute(self.to_root, to_rel);
        let Some(from_metadata) = try_metadata(&from).await? else {
            return Err(Error::precondition(format!(
                "'{from_rel}' is missing on the providing tree"
            )));
        };
        let existing = try_metadata(&to).await?;
        if existing.is_some() && !overwrite {
            return Err(Error::precondition(format!(
                "'{to_rel}' already exists on the receiving tree"
            )));
        }
        if self.dry_run {
            return Ok(());
        }

        let guard = ParentMtime::capture(self.to_root, to_rel).await;
        if from_metadata.is_dir() {
            if existing.is_some() {
                tokio::fs::remove_dir_all(&to).await.map_err(|e| Error::Io {
                    message: format!("replacing directory '{to_rel}': {e}"),
                })?;
            }
            self.copy_tree(&from, &to, to_rel).await?;
        } else {
            let modified = self.clamp(from_metadata.modified().map(DateTime::from).ok());
            copy_file(&from, &to, modified).await?;
        }
        guard.restore().await;
        debug!("applied copy: {from_rel} -> {to_rel}");
        Ok(())
    }

    fn copy_tree<'s>(
        &'s self,
        from: &'s Path,
        to: &'s Path,
        relative: &'s str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 's>> {
        Box::pin(async move {
            let from_metadata = tokio::fs::metadata(from).await.map_err(|e| Error::Io {
                message: format!("reading metadata for '{relative}': {e}"),
            })?;
            let modified = self.clamp(from_metadata.modified().map(DateTime::from).ok());
            tokio::fs::create_dir(to).await.map_err(|e| Error::Io {
                message: format!("creating directory '{relative}': {e}"),
            })?;

            let mut entries = tokio::fs::read_dir(from).await.map_err(|e| Error::Io {
                message: format!("reading directory '{relative}': {e}"),
            })?;
            while let Some(entry) = entries.next_entry().await.map_err(|e| Error::Io {
                message: format!("reading directory entry: {e}"),
            })? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let child_relative = path::join(relative, &name);
                let metadata = entry.metadata().await.map_err(|e| Error::Io {
                    message: format!("reading metadata for '{child_relative}': {e}"),
                })?;
                if metadata.is_dir() {
                    self.copy_tree(&entry.path(), &to.join(&name), &child_relative)
                        .await?;
                } else {
                    let child_modified = self.clamp(metadata.modified().map(DateTime::from).ok());
                    copy_file(&entry.path(), &to.join(&name), child_modified).await?;
                }
            }
            set_mtime(to, modified);
            Ok(())
        })
    }

    async fn check_source_file(
        &self,
        from: &Path,
        relative: &str,
        properties: ChangeProperties,
    ) -> Result<()> {
        let Some(metadata) = try_metadata(from).await? else {
            return Err(Error::precondition(format!(
                "'{relative}' is missing on the providing tree"
            )));
        };
        if !metadata.is_file() {
            return Err(Error::precondition(format!(
                "'{relative}' is not a file on the providing tree"
            )));
        }
        let modified: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if metadata.len() != properties.length
            || !timestamps_equal(modified, properties.last_write_time)
        {
            return Err(Error::precondition(format!(
                "'{relative}' no longer matches its recorded properties"
            )));
        }
        Ok(())
    }

    fn clamp(&self, modified: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = self.clock.now();
        match modified {
            Some(ts) if ts <= now => ts,
            _ => now,
        }
    }
}

fn absolute(root: &Path, relative: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in path::segments(relative) {
        out.push(segment);
    }
    out
}

async fn try_metadata(path: &Path) -> Result<Option<std::fs::Metadata>> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(Some(metadata)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io {
            message: format!("reading metadata for '{}': {e}", path.display()),
        }),
    }
}

async fn copy_file(from: &Path, to: &Path, modified: DateTime<Utc>) -> Result<()> {
    tokio::fs::copy(from, to).await.map_err(|e| Error::Io {
        message: format!(
            "copying '{}' to '{}': {e}",
            from.display(),
            to.display()
        ),
    })?;
    set_mtime(to, modified);
    Ok(())
}

fn set_mtime(path: &Path, modified: DateTime<Utc>) {
    let filetime = filetime::FileTime::from_system_time(modified.into());
    if let Err(e) = filetime::set_file_mtime(path, filetime) {
        warn!("cannot set write time on '{}': {e}", path.display());
    }
}

/// Captures the receiving parent directory's write time so it can be put
/// back after a child operation; the OS reset is noise, not a signal.
struct ParentMtime {
    parent: Option<PathBuf>,
    modified: Option<std::time::SystemTime>,
}

impl ParentMtime {
    async fn capture(to_root: &Path, relative: &str) -> Self {
        let parent = match path::parent(relative) {
            Some(parent_relative) => absolute(to_root, parent_relative),
            None => to_root.to_path_buf(),
        };
        let modified = tokio::fs::metadata(&parent)
            .await
            .ok()
            .and_then(|m| m.modified().ok());
        Self {
            parent: Some(parent),
            modified,
        }
    }

    async fn restore(self) {
        if let (Some(parent), Some(modified)) = (self.parent, self.modified) {
            let filetime = filetime::FileTime::from_system_time(modified);
            if let Err(e) = filetime::set_file_mtime(&parent, filetime) {
                warn!("cannot restore write time on '{}': {e}", parent.display());
            }
        }
    }
}
