//! The synchronizer run loop

use crate::apply::{apply_plan, ApplyOutcome, DirectionPlan};
use crate::conflict::{resolve_contents, resolve_names, ResolutionOps, ResolutionStrategy};
use crate::correlate::Correlation;
use crate::delta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use twinsync_config::{Config, ExcludeMatcher, ServiceLayout};
use twinsync_index::DirectoryIndex;
use twinsync_store::{EventLog, SyncHistory};
use twinsync_types::path::PathMatcher;
use twinsync_types::{
    Clock, EntryAction, EntryChange, Error, Result, SyncDirection, SyncStats,
};

/// Behavior knobs for a synchronizer
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Report what would be applied without touching either tree
    pub dry_run: bool,
    /// Whether the source delta trie merges stacked changes
    pub stacking: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            stacking: true,
        }
    }
}

/// One change that failed its apply-time preconditions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedChange {
    /// Direction the change was being applied in
    pub direction: SyncDirection,
    /// Path of the failed change
    pub path: String,
    /// Why the preconditions rejected it
    pub reason: String,
}

/// Wall-clock spent in each run phase
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PhaseTimings {
    /// Delta computation (both sides)
    pub delta: Duration,
    /// Trie correlation
    pub correlate: Duration,
    /// Conflict resolution
    pub resolve: Duration,
    /// Physical application (both directions)
    pub apply: Duration,
    /// Index merge and persistence
    pub post_merge: Duration,
}

/// Outcome of one synchronization run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Applied/failed counts per direction
    pub stats: SyncStats,
    /// Every change that failed preconditions this run
    pub failed: Vec<FailedChange>,
    /// Whether this run bootstrapped with no prior index
    pub first_run: bool,
    /// Whether this was a dry run
    pub dry_run: bool,
    /// When the run finished
    pub completed_at: DateTime<Utc>,
    /// Per-phase wall-clock
    pub phases: PhaseTimings,
}

/// The service-metadata folders are never synchronization content, no
/// matter what the injected matcher says.
#[derive(Debug)]
struct ServiceAwareExclude {
    inner: Arc<dyn PathMatcher>,
    service_dirs: Vec<String>,
}

impl PathMatcher for ServiceAwareExclude {
    fn is_match(&self, relative_path: &str) -> bool {
        if let Some(first) = twinsync_types::path::segments(relative_path).next() {
            if self.service_dirs.iter().any(|dir| dir == first) {
                return true;
            }
        }
        self.inner.is_match(relative_path)
    }
}

/// Reconciles one source/target root pair.
///
/// `run` is single-flight: overlapping invocations queue on an internal
/// mutex so two runs never interleave against the same pair of roots.
#[derive(Debug)]
pub struct Synchronizer {
    source_layout: ServiceLayout,
    target_layout: ServiceLayout,
    clock: Arc<dyn Clock>,
    exclude: Arc<dyn PathMatcher>,
    strategy: Arc<dyn ResolutionStrategy>,
    options: SyncOptions,
    run_lock: Mutex<()>,
}

impl Synchronizer {
    /// Create a synchronizer over explicit layouts and collaborators
    pub fn new(
        source_layout: ServiceLayout,
        target_layout: ServiceLayout,
        clock: Arc<dyn Clock>,
        exclude: Arc<dyn PathMatcher>,
        strategy: Arc<dyn ResolutionStrategy>,
        options: SyncOptions,
    ) -> Self {
        let service_dirs = [&source_layout, &target_layout]
            .into_iter()
            .filter_map(|layout| {
                layout
                    .service_dir()
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect();
        let exclude = Arc::new(ServiceAwareExclude {
            inner: exclude,
            service_dirs,
        });
        Self {
            source_layout,
            target_layout,
            clock,
            exclude,
            strategy,
            options,
            run_lock: Mutex::new(()),
        }
    }

    /// Create a synchronizer from loaded configuration
    pub fn from_config(
        config: &Config,
        clock: Arc<dyn Clock>,
        strategy: Arc<dyn ResolutionStrategy>,
    ) -> Result<Self> {
        let exclude = ExcludeMatcher::from_file(
            &config.service.dir_name,
            config.service.exclude_file.as_deref(),
        )
        .map_err(Error::from)?;
        Ok(Self::new(
            config.source_layout(),
            config.target_layout(),
            clock,
            Arc::new(exclude),
            strategy,
            SyncOptions {
                dry_run: config.sync.dry_run,
                stacking: config.sync.stacking,
            },
        ))
    }

    /// Execute one full reconciliation run.
    pub async fn run(&self) -> Result<SyncReport> {
        let _guard = self.run_lock.lock().await;
        let started = Instant::now();
        let mut phases = PhaseTimings::default();

        self.source_layout.ensure()?;
        self.target_layout.ensure()?;

        // Shared baseline: the last-serialized index, empty on first run.
        let (mut index, first_run) = self.load_index().await?;
        let history = SyncHistory::new(self.target_layout.history_path());
        let last_sync = history.read().await?.unwrap_or(DateTime::<Utc>::MIN_UTC);
        if first_run {
            info!("no index found, bootstrapping from live trees");
        }

        // Deltas. The source replays its event log; the target has none and
        // is re-derived by walking the live tree against the index. On the
        // first run the source is walked the same way.
        let phase_start = Instant::now();
        let log = EventLog::new(self.source_layout.event_log_path());
        let source_changes = if first_run {
            delta::tree_delta(
                self.clock.as_ref(),
                self.source_layout.root(),
                &index,
                last_sync,
                self.exclude.as_ref(),
            )
            .await?
        } else {
            log.load_all(self.clock.as_ref()).await?
        };
        let source_trie = delta::build_trie(source_changes, self.options.stacking)?;
        let target_changes = delta::tree_delta(
            self.clock.as_ref(),
            self.target_layout.root(),
            &index,
            last_sync,
            self.exclude.as_ref(),
        )
        .await?;
        let target_trie = delta::build_trie(target_changes, true)?;
        phases.delta = phase_start.elapsed();
        info!(
            "deltas: {} source change(s), {} target change(s)",
            source_trie.count(),
            target_trie.count()
        );

        // Correlation.
        let phase_start = Instant::now();
        let correlation = Correlation::compute(self.clock.as_ref(), &source_trie, &target_trie)?;
        let conflict_count = correlation.conflict_count();
        phases.correlate = phase_start.elapsed();

        // Resolution: contents first so deletions remove candidates before
        // names are distributed, then names.
        let phase_start = Instant::now();
        let mut ops = ResolutionOps::default();
        for conflict in &correlation.contents {
            ops.extend(resolve_contents(
                self.clock.as_ref(),
                conflict,
                self.strategy.as_ref(),
            )?);
        }
        for conflict in &correlation.names {
            ops.extend(resolve_names(conflict)?);
        }
        phases.resolve = phase_start.elapsed();

        // Directional plans and application. The target direction applies
        // first; resolution actions rely on that ordering when they read a
        // still-pristine source or an already-converged target.
        let phase_start = Instant::now();
        let mut to_target = correlation.to_target;
        to_target.extend(ops.to_target);
        let mut to_source = correlation.to_source;
        to_source.extend(ops.to_source);
        let target_plan = DirectionPlan::build(to_target, ops.target_actions)?;
        let source_plan = DirectionPlan::build(to_source, ops.source_actions)?;

        let target_outcome = apply_plan(
            self.clock.as_ref(),
            self.source_layout.root(),
            self.target_layout.root(),
            &target_plan,
            self.options.dry_run,
        )
        .await?;
        let source_outcome = apply_plan(
            self.clock.as_ref(),
            self.target_layout.root(),
            self.source_layout.root(),
            &source_plan,
            self.options.dry_run,
        )
        .await?;
        phases.apply = phase_start.elapsed();

        // Bookkeeping.
        let phase_start = Instant::now();
        if !self.options.dry_run {
            self.merge_applied(&mut index, &target_outcome, &source_outcome, &ops.index_only)?;
            self.persist_index(&index).await?;
            history.write(self.clock.now()).await?;
            log.clear().await?;
        }
        phases.post_merge = phase_start.elapsed();

        let mut stats = SyncStats::new();
        stats.conflicts = conflict_count as u64;
        let mut failed = Vec::new();
        collect_outcome(
            SyncDirection::SourceToTarget,
            &target_outcome,
            &mut stats,
            &mut failed,
        );
        collect_outcome(
            SyncDirection::TargetToSource,
            &source_outcome,
            &mut stats,
            &mut failed,
        );
        stats.duration = started.elapsed();

        if failed.is_empty() {
            info!(
                "sync complete: {} applied, {} conflict(s), {:?}",
                stats.total_applied(),
                stats.conflicts,
                stats.duration
            );
        } else {
            warn!(
                "sync complete with {} failed change(s); they will re-derive next run",
                failed.len()
            );
        }

        Ok(SyncReport {
            stats,
            failed,
            first_run,
            dry_run: self.options.dry_run,
            completed_at: self.clock.now(),
            phases,
        })
    }

    async fn load_index(&self) -> Result<(DirectoryIndex, bool)> {
        match tokio::fs::read_to_string(self.source_layout.index_path()).await {
            Ok(text) => Ok((DirectoryIndex::deserialize(&text)?, false)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok((DirectoryIndex::new(), true))
            }
            Err(e) => Err(Error::store(format!(
                "reading index '{}': {e}",
                self.source_layout.index_path().display()
            ))),
        }
    }

    /// Fold everything that actually applied into the shared baseline.
    ///
    /// Merge order tracks the dependency structure: directory creates from
    /// dropped create-create conflicts first (relayed children need their
    /// parent), then both directions' relayed non-renames, then relayed
    /// renames, then the remaining resolution outcomes, which may address
    /// post-rename names.
    fn merge_applied(
        &self,
        index: &mut DirectoryIndex,
        target_outcome: &ApplyOutcome,
        source_outcome: &ApplyOutcome,
        index_only: &[EntryChange],
    ) -> Result<()> {
        let exclude = Some(self.exclude.as_ref() as &dyn PathMatcher);
        let (merged_dirs, resolution_rest): (Vec<&EntryChange>, Vec<&EntryChange>) =
            index_only.iter().partition(|change| {
                change.action() == EntryAction::Create
                    && change.entry_type() == twinsync_types::EntryType::Directory
            });
        index.merge_changes(merged_dirs, exclude)?;

        let (renames, others): (Vec<&EntryChange>, Vec<&EntryChange>) = target_outcome
            .applied
            .iter()
            .chain(source_outcome.applied.iter())
            .partition(|change| change.action() == EntryAction::Rename);
        index.merge_changes(others, exclude)?;
        index.merge_changes(renames, exclude)?;
        index.merge_changes(resolution_rest, exclude)?;
        Ok(())
    }

    /// Serialize the merged index and place the identical bytes on both
    /// roots.
    async fn persist_index(&self, index: &DirectoryIndex) -> Result<()> {
        let text = index.serialize();
        for path in [
            self.source_layout.index_path(),
            self.target_layout.index_path(),
        ] {
            tokio::fs::write(&path, text.as_bytes())
                .await
                .map_err(|e| Error::store(format!("writing index '{}': {e}", path.display())))?;
        }
        Ok(())
    }
}

fn collect_outcome(
    direction: SyncDirection,
    outcome: &ApplyOutcome,
    stats: &mut SyncStats,
    failed: &mut Vec<FailedChange>,
) {
    for _ in &outcome.applied {
        stats.record(direction, true);
    }
    for _ in 0..outcome.actions_applied {
        stats.record(direction, true);
    }
    for (path, reason) in &outcome.failed {
        stats.record(direction, false);
        failed.push(FailedChange {
            direction,
            path: path.clone(),
            reason: reason.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::PreferNewer;
    use std::path::Path;
    use twinsync_types::ManualClock;

    #[derive(Debug)]
    struct AllowAll;
    impl PathMatcher for AllowAll {
        fn is_match(&self, _path: &str) -> bool {
            false
        }
    }

    fn synchronizer(source: &Path, target: &Path, options: SyncOptions) -> Synchronizer {
        Synchronizer::new(
            ServiceLayout::new(source, ".twinsync"),
            ServiceLayout::new(target, ".twinsync"),
            Arc::new(ManualClock::new(
                chrono::Utc::now() + chrono::Duration::seconds(300),
            )),
            Arc::new(AllowAll),
            Arc::new(PreferNewer),
            options,
        )
    }

    #[tokio::test]
    async fn test_first_run_brings_trees_together() {
        let source = tempfile::TempDir::new().unwrap();
        let target = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(source.path().join("docs")).unwrap();
        std::fs::write(source.path().join("docs/a.txt"), b"from source").unwrap();
        std::fs::write(target.path().join("only-here.txt"), b"from target").unwrap();

        let synchronizer =
            synchronizer(source.path(), target.path(), SyncOptions::default());
        let report = synchronizer.run().await.unwrap();

        assert!(report.first_run);
        assert!(report.failed.is_empty());
        assert_eq!(
            std::fs::read(target.path().join("docs/a.txt")).unwrap(),
            b"from source"
        );
        assert_eq!(
            std::fs::read(source.path().join("only-here.txt")).unwrap(),
            b"from target"
        );

        // Both index files hold identical bytes.
        let source_index =
            std::fs::read(source.path().join(".twinsync/index")).unwrap();
        let target_index =
            std::fs::read(target.path().join(".twinsync/index")).unwrap();
        assert_eq!(source_index, target_index);
        assert!(!source_index.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let source = tempfile::TempDir::new().unwrap();
        let target = tempfile::TempDir::new().unwrap();
        std::fs::write(source.path().join("a.txt"), b"stable").unwrap();

        let synchronizer =
            synchronizer(source.path(), target.path(), SyncOptions::default());
        let first = synchronizer.run().await.unwrap();
        assert!(first.stats.total_applied() > 0);

        let second = synchronizer.run().await.unwrap();
        assert!(!second.first_run);
        assert_eq!(second.stats.total_applied(), 0);
        assert_eq!(second.stats.total_failed(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_mutating() {
        let source = tempfile::TempDir::new().unwrap();
        let target = tempfile::TempDir::new().unwrap();
        std::fs::write(source.path().join("a.txt"), b"content").unwrap();

        let options = SyncOptions {
            dry_run: true,
            ..SyncOptions::default()
        };
        let synchronizer = synchronizer(source.path(), target.path(), options);
        let report = synchronizer.run().await.unwrap();

        assert!(report.dry_run);
        assert!(report.stats.applied_to_target > 0);
        assert!(!target.path().join("a.txt").exists());
        assert!(!source.path().join(".twinsync/index").exists());
    }
}
