//! Conflict classification and resolution
//!
//! Correlation hands over two kinds of conflicts. A **contents conflict**
//! is the same path carrying a pending change on both sides; a **names
//! conflict** is either one entry renamed differently on each side, or two
//! distinct entries converging on the same new name. Contents conflicts are
//! resolved first so deletions remove candidates before names are
//! distributed.
//!
//! Resolution output is split three ways, because what must happen on disk
//! and what the shared index must learn are not the same thing:
//!
//! - relayed changes (`to_target`/`to_source`) replay through the
//!   directional tries and merge into the index when they apply,
//! - resolved actions ([`ResolvedAction`]) run physically but never merge
//!   (they address current, post-rename paths the index has never seen),
//! - `index_only` records carry the net outcome into the index merge.
//!
//! Every (type, action) × (type, action) pairing is classified exhaustively.
//! Pairings that cannot arise from a consistent pair of tries (a `Create`
//! opposite anything but `Create` or `Delete`, any directory `Change`, a
//! type mismatch) raise the invalid-conflict error and abort the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use twinsync_types::{
    path, Clock, CommandAction, EntryAction, EntryChange, EntryCommand, EntryType, Error,
    RenameProperties, Result,
};

/// One side of a conflict as correlation saw it
#[derive(Debug, Clone)]
pub struct ConflictSide {
    /// The pending change value
    pub change: EntryChange,
    /// Entry kind tracked by the trie node
    pub entry_type: EntryType,
    /// Pending rename carried beside a non-rename value, if any
    pub pending_rename: Option<String>,
    /// Most time-relevant pending change in the node's subtree
    pub priority: Option<EntryChange>,
}

impl ConflictSide {
    /// The instant used for priority comparisons: the subtree priority when
    /// present, the change's own timestamp otherwise.
    pub fn instant(&self) -> DateTime<Utc> {
        self.priority
            .as_ref()
            .unwrap_or(&self.change)
            .timestamp()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Current name of the entry on this side's tree
    pub fn current_name(&self) -> String {
        self.pending_rename
            .clone()
            .unwrap_or_else(|| self.change.name().to_string())
    }

    /// Current path of the entry on this side's tree
    pub fn current_path(&self) -> String {
        path::with_basename(self.change.old_path(), &self.current_name())
    }
}

/// Same path, pending change on both sides
#[derive(Debug, Clone)]
pub struct ContentsConflict {
    /// Shared pre-sync path of the entry
    pub path: String,
    /// Source-side pending change
    pub source: ConflictSide,
    /// Target-side pending change
    pub target: ConflictSide,
}

/// Two entries colliding on a name, or one entry with two names
#[derive(Debug, Clone)]
pub enum NamesConflict {
    /// The same entry was renamed differently on each side
    OneEntryTwoNames {
        /// Source-side pending change
        source: ConflictSide,
        /// Target-side pending change
        target: ConflictSide,
    },
    /// Two distinct entries converged on the same new name
    TwoEntriesOneName {
        /// Name both entries want
        name: String,
        /// Source-side pending change
        source: ConflictSide,
        /// Target-side pending change
        target: ConflictSide,
    },
}

/// Resolution option for a contents conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionChoice {
    /// Accept the target's deletion: remove the entry from the source tree
    DeleteSource,
    /// Accept the source's deletion: remove the entry from the target tree
    DeleteTarget,
    /// Copy the source entry onto the target tree
    CopySourceToTarget {
        /// Replace an existing target entry
        overwrite: bool,
    },
    /// Copy the target entry onto the source tree
    CopyTargetToSource {
        /// Replace an existing source entry
        overwrite: bool,
    },
}

impl ResolutionChoice {
    fn favors_source(self) -> bool {
        matches!(
            self,
            Self::CopySourceToTarget { .. } | Self::DeleteTarget
        )
    }
}

/// Chooses among resolution options when more than one is valid.
///
/// The single remaining option is always applied without consulting the
/// strategy; batch runs therefore plug in a non-interactive strategy and a
/// run never blocks on a console.
pub trait ResolutionStrategy: Send + Sync + std::fmt::Debug {
    /// Pick one of `options` (never empty) for `conflict`
    fn choose(&self, conflict: &ContentsConflict, options: &[ResolutionChoice]) -> ResolutionChoice;
}

/// Pick whichever side saw activity more recently; ties go to the source
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferNewer;

impl ResolutionStrategy for PreferNewer {
    fn choose(&self, conflict: &ContentsConflict, options: &[ResolutionChoice]) -> ResolutionChoice {
        let source_wins = conflict.source.instant() >= conflict.target.instant();
        options
            .iter()
            .copied()
            .find(|choice| choice.favors_source() == source_wins)
            .unwrap_or(options[0])
    }
}

/// Always keep the source side
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferSource;

impl ResolutionStrategy for PreferSource {
    fn choose(&self, _conflict: &ContentsConflict, options: &[ResolutionChoice]) -> ResolutionChoice {
        options
            .iter()
            .copied()
            .find(|choice| choice.favors_source())
            .unwrap_or(options[0])
    }
}

/// Always keep the target side
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferTarget;

impl ResolutionStrategy for PreferTarget {
    fn choose(&self, _conflict: &ContentsConflict, options: &[ResolutionChoice]) -> ResolutionChoice {
        options
            .iter()
            .copied()
            .find(|choice| !choice.favors_source())
            .unwrap_or(options[0])
    }
}

/// One physically-resolved operation against a single tree.
///
/// Most decisions are plain [`EntryCommand`]s. Content transfers between
/// entries that currently sit under different names on the two trees need
/// both addresses spelled out.
#[derive(Debug, Clone)]
pub enum ResolvedAction {
    /// A same-path command
    Command(EntryCommand),
    /// Copy content across diverged names
    CrossCopy {
        /// Path of the entry on the providing tree
        from: String,
        /// Path the content lands at on the receiving tree
        to: String,
        /// Replace an existing entry at the destination
        overwrite: bool,
    },
}

impl ResolvedAction {
    fn copy(from: String, to: String, overwrite: bool) -> Result<Self> {
        if from == to {
            let action = if overwrite {
                CommandAction::CopyWithOverwrite
            } else {
                CommandAction::Copy
            };
            Ok(Self::Command(EntryCommand::new(from, action, None)?))
        } else {
            Ok(Self::CrossCopy {
                from,
                to,
                overwrite,
            })
        }
    }

    fn rename(current_path: String, new_name: String) -> Result<Self> {
        Ok(Self::Command(EntryCommand::new(
            current_path,
            CommandAction::Rename,
            Some(RenameProperties::new(new_name)),
        )?))
    }

    fn delete(current_path: String) -> Result<Self> {
        Ok(Self::Command(EntryCommand::new(
            current_path,
            CommandAction::Delete,
            None,
        )?))
    }
}

/// Directional operations produced by resolution
#[derive(Debug, Default)]
pub struct ResolutionOps {
    /// Changes replayed through the target-direction trie
    pub to_target: Vec<EntryChange>,
    /// Changes replayed through the source-direction trie
    pub to_source: Vec<EntryChange>,
    /// Resolved actions executed against the target tree
    pub target_actions: Vec<ResolvedAction>,
    /// Resolved actions executed against the source tree
    pub source_actions: Vec<ResolvedAction>,
    /// Net outcomes folded into the shared index but never applied
    pub index_only: Vec<EntryChange>,
    /// Conflicts that resolved to "no conflict, drop it"
    pub dropped: u64,
}

impl ResolutionOps {
    /// Fold another op set into this one
    pub fn extend(&mut self, other: ResolutionOps) {
        self.to_target.extend(other.to_target);
        self.to_source.extend(other.to_source);
        self.target_actions.extend(other.target_actions);
        self.source_actions.extend(other.source_actions);
        self.index_only.extend(other.index_only);
        self.dropped += other.dropped;
    }
}

/// Resolve one contents conflict through the exhaustive pairing table
pub fn resolve_contents(
    clock: &dyn Clock,
    conflict: &ContentsConflict,
    strategy: &dyn ResolutionStrategy,
) -> Result<ResolutionOps> {
    if conflict.source.entry_type != conflict.target.entry_type {
        return Err(Error::invalid_conflict(format!(
            "'{}' is tracked as {:?} on the source and {:?} on the target",
            conflict.path, conflict.source.entry_type, conflict.target.entry_type
        )));
    }
    let entry_type = conflict.source.entry_type;
    let source = &conflict.source.change;
    let target = &conflict.target.change;
    let mut ops = ResolutionOps::default();

    use EntryAction::{Change, Create, Delete, Rename};
    match (entry_type, source.action(), target.action()) {
        // Both sides deleted, or both renamed to the same name (divergent
        // names are routed to the names conflicts): each tree already holds
        // the agreed state, only the index needs to catch up.
        (_, Delete, Delete) | (_, Rename, Rename) => {
            debug!("conflict at '{}' already converged, dropping", conflict.path);
            ops.index_only.push(source.clone());
            ops.dropped += 1;
        }

        // Two directories appeared independently under the same name: they
        // merge, and the children were already reconciled by recursion.
        (EntryType::Directory, Create, Create) => {
            debug!("directory '{}' created on both sides, merging", conflict.path);
            ops.index_only.push(source.clone());
            ops.dropped += 1;
        }

        // File payloads meeting at the same path. A Create can only ever
        // face another Create: the entry is not in the shared index, so the
        // other side cannot know it under any other action.
        (EntryType::File, Create, Create) | (EntryType::File, Change, Change) => {
            resolve_file_pair(clock, conflict, strategy, &mut ops)?;
        }

        // A pure rename on one side and a content change on the other lose
        // nothing: each side auto-copies the component the other is missing.
        (EntryType::File, Rename, Change) => {
            // The rename replays on the target; the target's content lands
            // on the source's renamed entry once the target tree has
            // converged (the source direction applies second).
            ops.to_target.push(source.clone());
            let final_path = conflict.source.current_path();
            ops.source_actions.push(ResolvedAction::copy(
                final_path.clone(),
                final_path.clone(),
                true,
            )?);
            ops.index_only.push(target.clone().relocated(final_path));
        }
        (EntryType::File, Change, Rename) => {
            // Mirror image: the target direction applies first and reads a
            // still-pristine source, so content comes from the old path.
            ops.to_source.push(target.clone());
            let final_path = conflict.target.current_path();
            ops.target_actions.push(ResolvedAction::copy(
                conflict.source.current_path(),
                final_path.clone(),
                true,
            )?);
            ops.index_only.push(source.clone().relocated(final_path));
        }

        // Rename or change against a delete: keep the survivor or accept
        // the deletion.
        (_, Rename | Change, Delete) => {
            let options = [
                ResolutionChoice::CopySourceToTarget { overwrite: false },
                ResolutionChoice::DeleteSource,
            ];
            apply_choice(clock, conflict, strategy.choose(conflict, &options), &mut ops)?;
        }
        (_, Delete, Rename | Change) => {
            let options = [
                ResolutionChoice::CopyTargetToSource { overwrite: false },
                ResolutionChoice::DeleteTarget,
            ];
            apply_choice(clock, conflict, strategy.choose(conflict, &options), &mut ops)?;
        }

        // Everything else cannot arise from two consistent tries.
        (entry_type, source_action, target_action) => {
            return Err(Error::invalid_conflict(format!(
                "impossible pairing at '{}': {entry_type:?} {source_action:?} vs {target_action:?}",
                conflict.path
            )));
        }
    }
    Ok(ops)
}

/// Converge a file pair that exists on both sides: pick a winning side for
/// diverging content, pick a winning name for diverging pending renames,
/// and leave the index with the net result.
fn resolve_file_pair(
    clock: &dyn Clock,
    conflict: &ContentsConflict,
    strategy: &dyn ResolutionStrategy,
    ops: &mut ResolutionOps,
) -> Result<()> {
    let content_equal = properties_equal(&conflict.source.change, &conflict.target.change);
    let source_wins = if content_equal {
        conflict.source.instant() >= conflict.target.instant()
    } else {
        let options = [
            ResolutionChoice::CopySourceToTarget { overwrite: true },
            ResolutionChoice::CopyTargetToSource { overwrite: true },
        ];
        strategy.choose(conflict, &options).favors_source()
    };
    let (winner, loser) = if source_wins {
        (&conflict.source, &conflict.target)
    } else {
        (&conflict.target, &conflict.source)
    };
    let final_name = winner.current_name();
    let final_path = path::with_basename(conflict.path.as_str(), &final_name);

    // Name convergence: the loser's tree renames its entry to the winning
    // name before any content lands on it.
    let loser_actions = if source_wins {
        &mut ops.target_actions
    } else {
        &mut ops.source_actions
    };
    if loser.current_name() != final_name {
        loser_actions.push(ResolvedAction::rename(
            loser.current_path(),
            final_name.clone(),
        )?);
    }

    // Content convergence.
    if content_equal {
        ops.dropped += 1;
    } else {
        info!(
            "file conflict at '{}': {} side wins",
            conflict.path,
            if source_wins { "source" } else { "target" }
        );
        let loser_actions = if source_wins {
            &mut ops.target_actions
        } else {
            &mut ops.source_actions
        };
        loser_actions.push(ResolvedAction::copy(
            winner.current_path(),
            final_path.clone(),
            true,
        )?);
    }

    // Index: the rename (when any side renamed) and the winning payload,
    // addressed at the final name.
    let original_name = path::basename(&conflict.path);
    if final_name != original_name {
        ops.index_only.push(EntryChange::rename(
            clock,
            winner.change.timestamp(),
            conflict.path.clone(),
            winner.entry_type,
            final_name,
        )?);
    }
    ops.index_only
        .push(winner.change.clone().relocated(final_path));
    Ok(())
}

fn apply_choice(
    clock: &dyn Clock,
    conflict: &ContentsConflict,
    choice: ResolutionChoice,
    ops: &mut ResolutionOps,
) -> Result<()> {
    info!("resolving conflict at '{}' with {choice:?}", conflict.path);
    let timestamp = Some(clock.now());
    match choice {
        ResolutionChoice::DeleteSource => {
            ops.source_actions
                .push(ResolvedAction::delete(conflict.source.current_path())?);
            ops.index_only.push(EntryChange::delete(
                clock,
                timestamp,
                conflict.path.clone(),
                conflict.source.entry_type,
            )?);
        }
        ResolutionChoice::DeleteTarget => {
            ops.target_actions
                .push(ResolvedAction::delete(conflict.target.current_path())?);
            ops.index_only.push(EntryChange::delete(
                clock,
                timestamp,
                conflict.path.clone(),
                conflict.target.entry_type,
            )?);
        }
        ResolutionChoice::CopySourceToTarget { overwrite } => {
            // Resurrect or replace under the source's current name.
            let final_path = conflict.source.current_path();
            ops.target_actions.push(ResolvedAction::copy(
                final_path.clone(),
                final_path,
                overwrite,
            )?);
            ops.index_only.push(conflict.source.change.clone());
        }
        ResolutionChoice::CopyTargetToSource { overwrite } => {
            let final_path = conflict.target.current_path();
            ops.source_actions.push(ResolvedAction::copy(
                final_path.clone(),
                final_path,
                overwrite,
            )?);
            ops.index_only.push(conflict.target.change.clone());
        }
    }
    Ok(())
}

fn properties_equal(lhs: &EntryChange, rhs: &EntryChange) -> bool {
    match (lhs.change_properties(), rhs.change_properties()) {
        (Some(a), Some(b)) => {
            a.length == b.length
                && a.last_write_time.timestamp_millis() == b.last_write_time.timestamp_millis()
        }
        (None, None) => true,
        _ => false,
    }
}

/// Suffix appended to the losing entry of a create collision so both
/// entries survive on both trees
pub const COEXIST_SUFFIX: &str = ".sync-conflict";

/// Resolve one names conflict by the newer-side priority rule (ties go to
/// the source).
pub fn resolve_names(conflict: &NamesConflict) -> Result<ResolutionOps> {
    let mut ops = ResolutionOps::default();
    match conflict {
        NamesConflict::OneEntryTwoNames { source, target } => {
            // One entry, two names: converge the losing tree on the winning
            // name. Both renames already happened physically on their own
            // trees, so only the loser's tree moves.
            let source_wins = source.instant() >= target.instant();
            let (winner, loser) = if source_wins {
                (source, target)
            } else {
                (target, source)
            };
            info!(
                "names conflict at '{}': '{}' wins over '{}'",
                winner.change.old_path(),
                winner.current_name(),
                loser.current_name()
            );
            let loser_actions = if source_wins {
                &mut ops.target_actions
            } else {
                &mut ops.source_actions
            };
            loser_actions.push(ResolvedAction::rename(
                loser.current_path(),
                winner.current_name(),
            )?);
            ops.index_only.push(winner.change.clone());
        }
        NamesConflict::TwoEntriesOneName { name, source, target } => {
            let source_wins = source.instant() >= target.instant();
            let (winner, loser) = if source_wins {
                (source, target)
            } else {
                (target, source)
            };
            info!(
                "name collision on '{name}': entry from '{}' wins",
                winner.change.old_path()
            );
            resolve_collision(name, winner, loser, source_wins, &mut ops)?;
        }
    }
    Ok(ops)
}

fn resolve_collision(
    name: &str,
    winner: &ConflictSide,
    loser: &ConflictSide,
    winner_is_source: bool,
    ops: &mut ResolutionOps,
) -> Result<()> {
    let contested_path = loser.current_path();

    // Step 1: the loser's tree moves its entry out of the contested name.
    // A renamed entry falls back to its original name (the opposite tree
    // still knows it there); a created entry has no older name and moves
    // aside so both survive.
    let aside_name = match loser.change.action() {
        EntryAction::Rename => path::basename(loser.change.old_path()).to_string(),
        EntryAction::Create => format!("{name}{COEXIST_SUFFIX}"),
        EntryAction::Change | EntryAction::Delete => {
            return Err(Error::invalid_conflict(format!(
                "name collision on '{name}' against a {:?}",
                loser.change.action()
            )));
        }
    };
    let loser_actions = if winner_is_source {
        &mut ops.target_actions
    } else {
        &mut ops.source_actions
    };
    loser_actions.push(ResolvedAction::rename(
        contested_path.clone(),
        aside_name.clone(),
    )?);

    // Step 2: the winner's entry materializes on the loser's tree. A
    // rename replays through the trie (the loser's tree still has the old
    // name); a create copies once the contested name is free.
    match winner.change.action() {
        EntryAction::Rename => {
            let relay = if winner_is_source {
                &mut ops.to_target
            } else {
                &mut ops.to_source
            };
            relay.push(winner.change.clone());
        }
        EntryAction::Create => {
            let loser_actions = if winner_is_source {
                &mut ops.target_actions
            } else {
                &mut ops.source_actions
            };
            loser_actions.push(ResolvedAction::copy(
                winner.current_path(),
                winner.current_path(),
                false,
            )?);
            ops.index_only.push(winner.change.clone());
        }
        _ => {
            return Err(Error::invalid_conflict(format!(
                "name collision on '{name}' won by a {:?}",
                winner.change.action()
            )));
        }
    }

    // Step 3: a created loser also replays on the winner's tree under the
    // deconflicted name. The target direction applies first: when the loser
    // sits on the source tree its aside rename has not run yet, so content
    // still reads from the contested name.
    if loser.change.action() == EntryAction::Create {
        let aside_path = path::with_basename(&contested_path, &aside_name);
        let from = if winner_is_source {
            aside_path.clone()
        } else {
            contested_path
        };
        let winner_actions = if winner_is_source {
            &mut ops.source_actions
        } else {
            &mut ops.target_actions
        };
        winner_actions.push(ResolvedAction::copy(from, aside_path.clone(), false)?);
        ops.index_only
            .push(loser.change.clone().relocated(aside_path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use twinsync_types::{ChangeProperties, ManualClock};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    fn side(change: EntryChange, entry_type: EntryType) -> ConflictSide {
        ConflictSide {
            change,
            entry_type,
            pending_rename: None,
            priority: None,
        }
    }

    fn file_change(clock: &ManualClock, path: &str, seconds_ago: i64, length: u64) -> EntryChange {
        let ts = clock.now() - chrono::Duration::seconds(seconds_ago);
        EntryChange::change(clock, Some(ts), path, ChangeProperties::file(ts, length)).unwrap()
    }

    #[test]
    fn test_double_delete_drops_but_updates_index() {
        let clock = clock();
        let delete = |secs| {
            EntryChange::delete(
                &clock,
                Some(clock.now() - chrono::Duration::seconds(secs)),
                "a.txt",
                EntryType::File,
            )
            .unwrap()
        };
        let conflict = ContentsConflict {
            path: "a.txt".to_string(),
            source: side(delete(10), EntryType::File),
            target: side(delete(5), EntryType::File),
        };

        let ops = resolve_contents(&clock, &conflict, &PreferNewer).unwrap();
        assert_eq!(ops.dropped, 1);
        assert!(ops.to_source.is_empty() && ops.to_target.is_empty());
        assert_eq!(ops.index_only.len(), 1);
        assert_eq!(ops.index_only[0].action(), EntryAction::Delete);
    }

    #[test]
    fn test_directory_create_create_merges_into_index() {
        let clock = clock();
        let create = EntryChange::create(
            &clock,
            Some(clock.now()),
            "shared",
            EntryType::Directory,
            None,
        )
        .unwrap();
        let conflict = ContentsConflict {
            path: "shared".to_string(),
            source: side(create.clone(), EntryType::Directory),
            target: side(create, EntryType::Directory),
        };

        let ops = resolve_contents(&clock, &conflict, &PreferNewer).unwrap();
        assert_eq!(ops.dropped, 1);
        assert!(ops.target_actions.is_empty() && ops.source_actions.is_empty());
        // The merged directory still reaches the shared index.
        assert_eq!(ops.index_only.len(), 1);
        assert_eq!(ops.index_only[0].action(), EntryAction::Create);
    }

    #[test]
    fn test_diverging_file_changes_prefer_newer() {
        let clock = clock();
        let conflict = ContentsConflict {
            path: "doc.txt".to_string(),
            source: side(file_change(&clock, "doc.txt", 60, 10), EntryType::File),
            target: side(file_change(&clock, "doc.txt", 5, 20), EntryType::File),
        };

        let ops = resolve_contents(&clock, &conflict, &PreferNewer).unwrap();
        // Target wins: its content is copied onto the source tree.
        assert_eq!(ops.source_actions.len(), 1);
        assert!(matches!(
            &ops.source_actions[0],
            ResolvedAction::Command(cmd) if cmd.action() == CommandAction::CopyWithOverwrite
        ));
        assert!(ops.target_actions.is_empty());
        // The index learns the winning payload.
        assert_eq!(ops.index_only.len(), 1);
        assert_eq!(ops.index_only[0].change_properties().unwrap().length, 20);
    }

    #[test]
    fn test_equal_file_changes_drop() {
        let clock = clock();
        let ts = clock.now() - chrono::Duration::seconds(30);
        let change = EntryChange::change(
            &clock,
            Some(ts),
            "doc.txt",
            ChangeProperties::file(ts, 42),
        )
        .unwrap();
        let conflict = ContentsConflict {
            path: "doc.txt".to_string(),
            source: side(change.clone(), EntryType::File),
            target: side(change, EntryType::File),
        };

        let ops = resolve_contents(&clock, &conflict, &PreferNewer).unwrap();
        assert_eq!(ops.dropped, 1);
        assert!(ops.source_actions.is_empty() && ops.target_actions.is_empty());
        assert_eq!(ops.index_only.len(), 1);
    }

    #[test]
    fn test_rename_vs_change_auto_copies_both_ways() {
        let clock = clock();
        let rename = EntryChange::rename(
            &clock,
            Some(clock.now() - chrono::Duration::seconds(8)),
            "doc.txt",
            EntryType::File,
            "renamed.txt",
        )
        .unwrap();
        let conflict = ContentsConflict {
            path: "doc.txt".to_string(),
            source: side(rename, EntryType::File),
            target: side(file_change(&clock, "doc.txt", 5, 64), EntryType::File),
        };

        let ops = resolve_contents(&clock, &conflict, &PreferNewer).unwrap();
        // The rename replays on the target, the content lands on the source.
        assert_eq!(ops.to_target.len(), 1);
        assert_eq!(ops.to_target[0].action(), EntryAction::Rename);
        assert_eq!(ops.source_actions.len(), 1);
        // The index ends with the new content under the new name.
        assert_eq!(ops.index_only.len(), 1);
        assert_eq!(ops.index_only[0].old_path(), "renamed.txt");
        assert_eq!(ops.index_only[0].action(), EntryAction::Change);
    }

    #[test]
    fn test_change_vs_delete_offers_both_options() {
        let clock = clock();
        let conflict = ContentsConflict {
            path: "doc.txt".to_string(),
            source: side(file_change(&clock, "doc.txt", 5, 64), EntryType::File),
            target: side(
                EntryChange::delete(
                    &clock,
                    Some(clock.now() - chrono::Duration::seconds(60)),
                    "doc.txt",
                    EntryType::File,
                )
                .unwrap(),
                EntryType::File,
            ),
        };

        // Newer source change resurrects the file on the target.
        let ops = resolve_contents(&clock, &conflict, &PreferNewer).unwrap();
        assert_eq!(ops.target_actions.len(), 1);
        assert!(matches!(
            &ops.target_actions[0],
            ResolvedAction::Command(cmd) if cmd.action() == CommandAction::Copy
        ));

        // A target-preferring strategy accepts the deletion instead.
        let ops = resolve_contents(&clock, &conflict, &PreferTarget).unwrap();
        assert_eq!(ops.source_actions.len(), 1);
        assert!(matches!(
            &ops.source_actions[0],
            ResolvedAction::Command(cmd) if cmd.action() == CommandAction::Delete
        ));
        assert_eq!(ops.index_only.len(), 1);
        assert_eq!(ops.index_only[0].action(), EntryAction::Delete);
    }

    #[test]
    fn test_type_mismatch_is_invalid() {
        let clock = clock();
        let file_create = EntryChange::create(
            &clock,
            Some(clock.now()),
            "x",
            EntryType::File,
            Some(ChangeProperties::file(clock.now(), 1)),
        )
        .unwrap();
        let dir_create =
            EntryChange::create(&clock, Some(clock.now()), "x", EntryType::Directory, None)
                .unwrap();
        let conflict = ContentsConflict {
            path: "x".to_string(),
            source: side(file_create, EntryType::File),
            target: side(dir_create, EntryType::Directory),
        };

        assert!(matches!(
            resolve_contents(&clock, &conflict, &PreferNewer),
            Err(Error::InvalidConflict { .. })
        ));
    }

    #[test]
    fn test_create_vs_delete_is_invalid() {
        let clock = clock();
        let conflict = ContentsConflict {
            path: "x".to_string(),
            source: side(
                EntryChange::create(
                    &clock,
                    Some(clock.now()),
                    "x",
                    EntryType::File,
                    Some(ChangeProperties::file(clock.now(), 1)),
                )
                .unwrap(),
                EntryType::File,
            ),
            target: side(
                EntryChange::delete(&clock, Some(clock.now()), "x", EntryType::File).unwrap(),
                EntryType::File,
            ),
        };

        assert!(matches!(
            resolve_contents(&clock, &conflict, &PreferNewer),
            Err(Error::InvalidConflict { .. })
        ));
    }

    #[test]
    fn test_one_entry_two_names_newer_wins() {
        let clock = clock();
        let source_rename = EntryChange::rename(
            &clock,
            Some(clock.now() - chrono::Duration::seconds(5)),
            "docs/report.txt",
            EntryType::File,
            "final.txt",
        )
        .unwrap();
        let target_rename = EntryChange::rename(
            &clock,
            Some(clock.now() - chrono::Duration::seconds(50)),
            "docs/report.txt",
            EntryType::File,
            "draft.txt",
        )
        .unwrap();
        let conflict = NamesConflict::OneEntryTwoNames {
            source: side(source_rename, EntryType::File),
            target: side(target_rename, EntryType::File),
        };

        let ops = resolve_names(&conflict).unwrap();
        // The target tree renames draft.txt to the winning name.
        assert_eq!(ops.target_actions.len(), 1);
        assert!(matches!(
            &ops.target_actions[0],
            ResolvedAction::Command(cmd)
                if cmd.path() == "docs/draft.txt"
                    && cmd.rename_properties().unwrap().name == "final.txt"
        ));
        // The index learns the winner's original rename.
        assert_eq!(ops.index_only.len(), 1);
        assert_eq!(ops.index_only[0].old_path(), "docs/report.txt");
        assert!(ops.source_actions.is_empty());
    }

    #[test]
    fn test_create_collision_coexists() {
        let clock = clock();
        let ts_new = clock.now() - chrono::Duration::seconds(5);
        let ts_old = clock.now() - chrono::Duration::seconds(50);
        let source_create = EntryChange::create(
            &clock,
            Some(ts_new),
            "notes.txt",
            EntryType::File,
            Some(ChangeProperties::file(ts_new, 10)),
        )
        .unwrap();
        // The losing side arrived at the name through a rename of an older
        // entry.
        let target_rename = EntryChange::rename(
            &clock,
            Some(ts_old),
            "misc.txt",
            EntryType::File,
            "notes.txt",
        )
        .unwrap();
        let conflict = NamesConflict::TwoEntriesOneName {
            name: "notes.txt".to_string(),
            source: side(source_create, EntryType::File),
            target: side(target_rename, EntryType::File),
        };

        let ops = resolve_names(&conflict).unwrap();
        // The target reverts its rename, then receives the winner's create.
        assert_eq!(ops.target_actions.len(), 2);
        assert!(matches!(
            &ops.target_actions[0],
            ResolvedAction::Command(cmd)
                if cmd.rename_properties().unwrap().name == "misc.txt"
        ));
        // The winner's create reaches the index.
        assert!(ops
            .index_only
            .iter()
            .any(|change| change.action() == EntryAction::Create));
    }

    #[test]
    fn test_create_collision_between_two_creates() {
        let clock = clock();
        let ts_new = clock.now() - chrono::Duration::seconds(5);
        let ts_old = clock.now() - chrono::Duration::seconds(50);
        let create = |ts, len| {
            EntryChange::create(
                &clock,
                Some(ts),
                "notes.txt",
                EntryType::File,
                Some(ChangeProperties::file(ts, len)),
            )
            .unwrap()
        };
        let conflict = NamesConflict::TwoEntriesOneName {
            name: "notes.txt".to_string(),
            source: side(create(ts_new, 10), EntryType::File),
            target: side(create(ts_old, 20), EntryType::File),
        };

        let ops = resolve_names(&conflict).unwrap();
        // Loser moves aside and both entries replay everywhere.
        let aside = format!("notes.txt{COEXIST_SUFFIX}");
        assert!(ops.index_only.iter().any(|c| c.old_path() == aside));
        assert_eq!(ops.target_actions.len(), 2);
        assert_eq!(ops.source_actions.len(), 1);
    }
}
