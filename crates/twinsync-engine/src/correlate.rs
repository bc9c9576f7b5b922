//! Lock-step correlation of the two delta tries
//!
//! Both tries are walked together with an explicit stack (never recursion,
//! so deep trees cannot exhaust the call stack), pairing children by either
//! their old or their current name. A value on one side only is relayed to
//! the opposite tree unconditionally; values on both sides become contents
//! conflicts; diverging or colliding names become names conflicts. Subtree
//! recursion is skipped when the pair is type-incompatible or when either
//! side deletes a directory, since comparing children is meaningless there.

use crate::conflict::{ConflictSide, ContentsConflict, NamesConflict};
use std::collections::HashSet;
use tracing::debug;
use twinsync_trie::{FileSystemTrie, NodeId, NodeRef};
use twinsync_types::{Clock, EntryAction, EntryChange, EntryType, Result};

/// Output of walking the two delta tries in lock-step
#[derive(Debug, Default)]
pub struct Correlation {
    /// Source-only changes, to be replayed on the target tree
    pub to_target: Vec<EntryChange>,
    /// Target-only changes, to be replayed on the source tree
    pub to_source: Vec<EntryChange>,
    /// Paths pending on both sides
    pub contents: Vec<ContentsConflict>,
    /// Name divergences and collisions
    pub names: Vec<NamesConflict>,
}

impl Correlation {
    /// Total number of detected conflicts
    pub fn conflict_count(&self) -> usize {
        self.contents.len() + self.names.len()
    }

    /// Walk `source` and `target` together from their roots.
    pub fn compute(
        clock: &dyn Clock,
        source: &FileSystemTrie,
        target: &FileSystemTrie,
    ) -> Result<Self> {
        let mut correlation = Self::default();
        let mut stack: Vec<(NodeId, NodeId)> = vec![(source.root().id(), target.root().id())];

        while let Some((source_id, target_id)) = stack.pop() {
            let source_node = source.node(source_id);
            let target_node = target.node(target_id);
            let mut matched: HashSet<NodeId> = HashSet::new();

            for source_child in source_node.children() {
                correlation.pair_child(
                    clock,
                    source_child,
                    target_node,
                    &mut matched,
                    &mut stack,
                )?;
            }
            for target_child in target_node.children() {
                if !matched.contains(&target_child.id()) {
                    relay_subtree(clock, target_child, &mut correlation.to_source)?;
                }
            }
        }

        debug!(
            "correlation: {} to target, {} to source, {} contents conflict(s), {} names conflict(s)",
            correlation.to_target.len(),
            correlation.to_source.len(),
            correlation.contents.len(),
            correlation.names.len()
        );
        Ok(correlation)
    }

    fn pair_child(
        &mut self,
        clock: &dyn Clock,
        source_child: NodeRef<'_>,
        target_parent: NodeRef<'_>,
        matched: &mut HashSet<NodeId>,
        stack: &mut Vec<(NodeId, NodeId)>,
    ) -> Result<()> {
        // Identity first: the counterpart tracking the same pre-sync entry
        // answers to the source child's old name on either of its maps.
        if let Some(target_child) = target_parent.child(source_child.old_name()) {
            matched.insert(target_child.id());
            return self.handle_pair(clock, source_child, target_child, stack);
        }

        // No identity match; a different entry may still occupy the source
        // child's new name ("two entries, one name").
        if source_child.name() != source_child.old_name() {
            if let Some(collided) = target_parent.child(source_child.name()) {
                if let (Some(source_value), Some(target_value)) =
                    (source_child.value(), collided.value())
                {
                    matched.insert(collided.id());
                    self.names.push(NamesConflict::TwoEntriesOneName {
                        name: source_child.name().to_string(),
                        source: conflict_side(source_child, source_value),
                        target: conflict_side(collided, target_value),
                    });
                    return Ok(());
                }
            }
        }

        relay_subtree(clock, source_child, &mut self.to_target)
    }

    fn handle_pair(
        &mut self,
        clock: &dyn Clock,
        source_child: NodeRef<'_>,
        target_child: NodeRef<'_>,
        stack: &mut Vec<(NodeId, NodeId)>,
    ) -> Result<()> {
        match (source_child.value(), target_child.value()) {
            (Some(source_value), Some(target_value)) => {
                // Pure renames diverging on the target name are a names
                // conflict; a change that merely accumulated a rename keeps
                // its content question and resolves as a contents conflict.
                if source_value.action() == EntryAction::Rename
                    && target_value.action() == EntryAction::Rename
                    && source_child.name() != target_child.name()
                {
                    // One entry, two names.
                    self.names.push(NamesConflict::OneEntryTwoNames {
                        source: conflict_side(source_child, source_value),
                        target: conflict_side(target_child, target_value),
                    });
                } else {
                    self.contents.push(ContentsConflict {
                        path: source_child.old_path(),
                        source: conflict_side(source_child, source_value),
                        target: conflict_side(target_child, target_value),
                    });
                }
            }
            (Some(_), None) => relay_node(clock, source_child, &mut self.to_target)?,
            (None, Some(_)) => relay_node(clock, target_child, &mut self.to_source)?,
            (None, None) => {}
        }

        if recursion_allowed(source_child, target_child) {
            stack.push((source_child.id(), target_child.id()));
        }
        Ok(())
    }
}

fn recursion_allowed(source: NodeRef<'_>, target: NodeRef<'_>) -> bool {
    if source.entry_type() != target.entry_type() {
        return false;
    }
    let deletes_directory = |node: NodeRef<'_>| {
        node.entry_type() == EntryType::Directory
            && node
                .value()
                .is_some_and(|value| value.action() == EntryAction::Delete)
    };
    !deletes_directory(source) && !deletes_directory(target)
}

fn conflict_side(node: NodeRef<'_>, value: &EntryChange) -> ConflictSide {
    // Renames carry their target in the value; relocated creates already
    // sit at their final path. Only a change keeps the rename on the node.
    let pending_rename = (node.has_pending_rename()
        && value.action() == EntryAction::Change)
        .then(|| node.name().to_string());
    ConflictSide {
        change: value.clone(),
        entry_type: node.entry_type(),
        pending_rename,
        priority: node.priority_value().cloned(),
    }
}

/// Emit the node's own pending change (plus its pending rename component)
/// into `out`.
fn relay_node(clock: &dyn Clock, node: NodeRef<'_>, out: &mut Vec<EntryChange>) -> Result<()> {
    if let Some(value) = node.value() {
        out.push(value.clone());
        if node.has_pending_rename() && value.action() == EntryAction::Change {
            // Changes that accumulated a rename replay as change-then-rename
            // so the receiving trie rebuilds the same node state.
            out.push(EntryChange::rename(
                clock,
                value.timestamp(),
                node.old_path(),
                node.entry_type(),
                node.name(),
            )?);
        }
    }
    Ok(())
}

/// Relay every valued node of a subtree that exists on one side only.
fn relay_subtree(clock: &dyn Clock, node: NodeRef<'_>, out: &mut Vec<EntryChange>) -> Result<()> {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        relay_node(clock, current, out)?;
        let skip_children = current.entry_type() == EntryType::Directory
            && current
                .value()
                .is_some_and(|value| value.action() == EntryAction::Delete);
        if !skip_children {
            stack.extend(current.children());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::build_trie;
    use chrono::{TimeZone, Utc};
    use twinsync_types::{ChangeProperties, ManualClock};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap())
    }

    fn file_create(clock: &ManualClock, path: &str, seconds_ago: i64) -> EntryChange {
        let ts = clock.now() - chrono::Duration::seconds(seconds_ago);
        EntryChange::create(
            clock,
            Some(ts),
            path,
            EntryType::File,
            Some(ChangeProperties::file(ts, 8)),
        )
        .unwrap()
    }

    #[test]
    fn test_one_sided_changes_relay() {
        let clock = clock();
        let source = build_trie([file_create(&clock, "docs/new.txt", 10)], true).unwrap();
        let target = build_trie(
            [EntryChange::delete(
                &clock,
                Some(clock.now() - chrono::Duration::seconds(5)),
                "old.txt",
                EntryType::File,
            )
            .unwrap()],
            true,
        )
        .unwrap();

        let correlation = Correlation::compute(&clock, &source, &target).unwrap();
        assert_eq!(correlation.to_target.len(), 1);
        assert_eq!(correlation.to_target[0].old_path(), "docs/new.txt");
        assert_eq!(correlation.to_source.len(), 1);
        assert_eq!(correlation.to_source[0].old_path(), "old.txt");
        assert_eq!(correlation.conflict_count(), 0);
    }

    #[test]
    fn test_both_sided_value_is_contents_conflict() {
        let clock = clock();
        let change = |secs, len| {
            let ts = clock.now() - chrono::Duration::seconds(secs);
            EntryChange::change(&clock, Some(ts), "doc.txt", ChangeProperties::file(ts, len))
                .unwrap()
        };
        let source = build_trie([change(10, 5)], true).unwrap();
        let target = build_trie([change(5, 9)], true).unwrap();

        let correlation = Correlation::compute(&clock, &source, &target).unwrap();
        assert_eq!(correlation.contents.len(), 1);
        assert_eq!(correlation.contents[0].path, "doc.txt");
        assert!(correlation.to_target.is_empty());
        assert!(correlation.to_source.is_empty());
    }

    #[test]
    fn test_divergent_renames_are_names_conflict() {
        let clock = clock();
        let rename = |target_name: &str, secs| {
            EntryChange::rename(
                &clock,
                Some(clock.now() - chrono::Duration::seconds(secs)),
                "docs/report.txt",
                EntryType::File,
                target_name,
            )
            .unwrap()
        };
        let source = build_trie([rename("final.txt", 5)], true).unwrap();
        let target = build_trie([rename("draft.txt", 10)], true).unwrap();

        let correlation = Correlation::compute(&clock, &source, &target).unwrap();
        assert_eq!(correlation.names.len(), 1);
        assert!(matches!(
            correlation.names[0],
            NamesConflict::OneEntryTwoNames { .. }
        ));
        assert_eq!(correlation.contents.len(), 0);
    }

    #[test]
    fn test_same_rename_both_sides_is_contents_conflict() {
        let clock = clock();
        let rename = |secs| {
            EntryChange::rename(
                &clock,
                Some(clock.now() - chrono::Duration::seconds(secs)),
                "docs/report.txt",
                EntryType::File,
                "final.txt",
            )
            .unwrap()
        };
        let source = build_trie([rename(5)], true).unwrap();
        let target = build_trie([rename(10)], true).unwrap();

        let correlation = Correlation::compute(&clock, &source, &target).unwrap();
        assert_eq!(correlation.contents.len(), 1);
        assert_eq!(correlation.names.len(), 0);
    }

    #[test]
    fn test_rename_collision_is_names_conflict() {
        let clock = clock();
        let source = build_trie(
            [EntryChange::rename(
                &clock,
                Some(clock.now() - chrono::Duration::seconds(5)),
                "a.txt",
                EntryType::File,
                "shared.txt",
            )
            .unwrap()],
            true,
        )
        .unwrap();
        let target = build_trie(
            [EntryChange::rename(
                &clock,
                Some(clock.now() - chrono::Duration::seconds(10)),
                "b.txt",
                EntryType::File,
                "shared.txt",
            )
            .unwrap()],
            true,
        )
        .unwrap();

        let correlation = Correlation::compute(&clock, &source, &target).unwrap();
        assert_eq!(correlation.names.len(), 1);
        assert!(matches!(
            &correlation.names[0],
            NamesConflict::TwoEntriesOneName { name, .. } if name == "shared.txt"
        ));
        // The unmatched target entry is not relayed; it is part of the
        // conflict resolution.
        assert!(correlation.to_source.is_empty());
    }

    #[test]
    fn test_deleted_directory_skips_children() {
        let clock = clock();
        let source = build_trie(
            [EntryChange::delete(
                &clock,
                Some(clock.now() - chrono::Duration::seconds(5)),
                "docs",
                EntryType::Directory,
            )
            .unwrap()],
            true,
        )
        .unwrap();
        let target = build_trie([file_create(&clock, "docs/inner.txt", 10)], true).unwrap();

        let correlation = Correlation::compute(&clock, &source, &target).unwrap();
        // The delete relays; the target's pending child under the deleted
        // directory is moot and must not.
        assert_eq!(correlation.to_target.len(), 1);
        assert_eq!(correlation.to_target[0].action(), EntryAction::Delete);
        assert!(correlation.to_source.is_empty());
    }
}
