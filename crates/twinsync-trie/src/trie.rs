//! The change trie and its action stacking rules

use crate::node::{Node, NodeId, NodeRef};
use tracing::trace;
use twinsync_types::{path, EntryAction, EntryChange, EntryType, Error, Result};

const ROOT: NodeId = 0;

/// Compressed prefix tree over slash-separated paths, aggregating pending
/// changes and collapsing redundant action sequences.
#[derive(Debug, Clone)]
pub struct FileSystemTrie {
    nodes: Vec<Node>,
    levels: Vec<Vec<NodeId>>,
    stacking: bool,
}

impl Default for FileSystemTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystemTrie {
    /// Create an empty trie with stacking enabled
    pub fn new() -> Self {
        Self::with_stacking(true)
    }

    /// Create an empty trie.
    ///
    /// With stacking disabled, a second change arriving for a path that
    /// already holds a pending value is an invariant error instead of being
    /// merged through the action-pair table.
    pub fn with_stacking(stacking: bool) -> Self {
        Self {
            nodes: vec![Node::new(String::new(), EntryType::Directory, None, 0)],
            levels: vec![vec![ROOT]],
            stacking,
        }
    }

    /// Number of pending (valued) nodes in the trie
    pub fn count(&self) -> u32 {
        self.nodes[ROOT].subtree_count
    }

    /// Whether the trie holds no pending changes
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Deepest populated level
    pub fn max_depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// View of the synthetic root node
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            trie: self,
            id: ROOT,
        }
    }

    /// View of an arbitrary node by id
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { trie: self, id }
    }

    /// Ids of the live nodes at one path depth. Supports level-by-level
    /// application ordering.
    pub fn level(&self, depth: usize) -> Vec<NodeId> {
        self.levels
            .get(depth)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&id| !self.nodes[id].detached)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn node_raw(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Walk to the node for `relative_path`, consulting both the current-
    /// and old-name maps at every level.
    pub fn get_node(&self, relative_path: &str) -> Option<NodeRef<'_>> {
        let mut current = self.root();
        for segment in path::segments(relative_path) {
            current = current.child(segment)?;
        }
        if current.id == ROOT {
            None
        } else {
            Some(current)
        }
    }

    /// Pending change at `relative_path`, if any
    pub fn get_value(&self, relative_path: &str) -> Option<&EntryChange> {
        self.get_node(relative_path).and_then(|node| node.value())
    }

    /// Ingest one observed change.
    ///
    /// Intermediate path segments become placeholder directory nodes. A
    /// second change for an already-pending path is merged through the
    /// action-pair stacking table; invalid pairings (any `Create` not
    /// preceded by `Delete`, anything after a still-pending `Delete`) fail,
    /// since the event stream is assumed causally ordered per path.
    pub fn add(&mut self, change: EntryChange) -> Result<()> {
        let parts: Vec<String> = path::segments(change.old_path())
            .map(str::to_string)
            .collect();
        let Some((leaf, ancestors)) = parts.split_last() else {
            return Err(Error::invariant("change with empty path reached the trie"));
        };

        let mut current = ROOT;
        for part in ancestors {
            current = match self.child_by_either_name(current, part) {
                Some(id) => {
                    if self.nodes[id].entry_type == EntryType::File {
                        return Err(Error::invariant(format!(
                            "file node '{part}' cannot contain '{}'",
                            change.old_path()
                        )));
                    }
                    id
                }
                None => self.new_node(current, part, EntryType::Directory),
            };
        }

        trace!("trie add: {} {:?}", change.old_path(), change.action());
        match self.child_by_either_name(current, leaf) {
            None => self.install_new_leaf(current, leaf, change),
            Some(id) if self.nodes[id].value.is_none() => self.promote_placeholder(id, change),
            Some(id) => self.stack(id, change),
        }
    }

    /// Remove the pending value at `relative_path`, reverting the node's
    /// name and pruning dangling placeholder ancestors. With `recursive`,
    /// the whole subtree is cleared first.
    pub fn clear(&mut self, relative_path: &str, recursive: bool) -> Result<()> {
        let id = self
            .get_node(relative_path)
            .map(|node| node.id)
            .ok_or_else(|| Error::not_found(relative_path))?;
        self.clear_node(id, recursive)
    }

    fn child_by_either_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        let node = &self.nodes[parent];
        node.children_by_name
            .get(name)
            .or_else(|| node.children_by_old_name.get(name))
            .copied()
    }

    fn new_node(&mut self, parent: NodeId, old_name: &str, entry_type: EntryType) -> NodeId {
        let depth = self.nodes[parent].depth + 1;
        let id = self.nodes.len();
        self.nodes
            .push(Node::new(old_name.to_string(), entry_type, Some(parent), depth));
        let parent_node = &mut self.nodes[parent];
        parent_node
            .children_by_name
            .insert(old_name.to_string(), id);
        parent_node
            .children_by_old_name
            .insert(old_name.to_string(), id);
        if self.levels.len() <= depth {
            self.levels.resize(depth + 1, Vec::new());
        }
        self.levels[depth].push(id);
        id
    }

    fn install_new_leaf(&mut self, parent: NodeId, leaf: &str, change: EntryChange) -> Result<()> {
        let id = self.new_node(parent, leaf, change.entry_type());
        if change.action() == EntryAction::Rename {
            let target = change
                .rename_properties()
                .ok_or_else(|| Error::invariant("rename change without properties"))?
                .name
                .clone();
            self.set_name(id, &target)?;
        }
        self.set_value(id, change)
    }

    fn promote_placeholder(&mut self, id: NodeId, change: EntryChange) -> Result<()> {
        // A valueless node still in the trie is a directory ancestor kept
        // alive by deeper pending changes; a file here is a contradiction.
        if self.nodes[id].entry_type == EntryType::File
            || change.entry_type() == EntryType::File
        {
            return Err(Error::invariant(format!(
                "placeholder '{}' cannot take a file change",
                change.old_path()
            )));
        }
        if change.action() == EntryAction::Rename {
            let target = change
                .rename_properties()
                .ok_or_else(|| Error::invariant("rename change without properties"))?
                .name
                .clone();
            self.set_name(id, &target)?;
        }
        let is_delete = change.action() == EntryAction::Delete;
        self.set_value(id, change)?;
        if is_delete {
            // Pending sub-changes are moot once the directory goes away.
            // The value is installed first so the node survives pruning.
            self.clear_children(id)?;
        }
        Ok(())
    }

    fn stack(&mut self, id: NodeId, change: EntryChange) -> Result<()> {
        if !self.stacking {
            return Err(Error::invariant(format!(
                "second change for pending path '{}' with stacking disabled",
                change.old_path()
            )));
        }
        if self.nodes[id].entry_type != change.entry_type() {
            return Err(Error::invariant(format!(
                "entry type flip for pending path '{}'",
                change.old_path()
            )));
        }

        let stored = self.nodes[id]
            .value
            .clone()
            .ok_or_else(|| Error::invariant("stacking against a valueless node"))?;

        match (stored.action(), change.action()) {
            (EntryAction::Delete, EntryAction::Create) => match change.entry_type() {
                // A recreated directory supersedes its deletion entirely.
                EntryType::Directory => self.clear_node(id, false),
                // A recreated file cannot be assumed identical; track as a
                // content change carrying the new properties.
                EntryType::File => {
                    let properties = change
                        .change_properties()
                        .ok_or_else(|| Error::invariant("file create without properties"))?;
                    let merged = stored.into_change(change.timestamp(), properties);
                    self.replace_value(id, merged)
                }
            },
            (EntryAction::Create, EntryAction::Rename) => {
                let target = change
                    .rename_properties()
                    .ok_or_else(|| Error::invariant("rename change without properties"))?
                    .name
                    .clone();
                self.set_name(id, &target)?;
                // The entry never existed under the intermediate name, so
                // the pending create moves to the final path.
                let relocated = stored
                    .relocated(path::with_basename(stored.old_path(), &target))
                    .refreshed(change.timestamp(), None);
                self.replace_value(id, relocated)
            }
            (EntryAction::Rename, EntryAction::Rename) => {
                let target = change
                    .rename_properties()
                    .ok_or_else(|| Error::invariant("rename change without properties"))?
                    .name
                    .clone();
                if target == self.nodes[id].old_name {
                    // The rename chain came back to the original name.
                    self.clear_node(id, false)
                } else {
                    self.set_name(id, &target)?;
                    let merged = stored.retargeted(target).refreshed(change.timestamp(), None);
                    self.replace_value(id, merged)
                }
            }
            (EntryAction::Change, EntryAction::Rename) => {
                let target = change
                    .rename_properties()
                    .ok_or_else(|| Error::invariant("rename change without properties"))?
                    .name
                    .clone();
                // The content change stays pending either way; only the
                // name component cancels when it returns to the original.
                self.set_name(id, &target)
            }
            (EntryAction::Rename, EntryAction::Change) => {
                let properties = change
                    .change_properties()
                    .ok_or_else(|| Error::invariant("change record without properties"))?;
                let merged = stored.into_change(change.timestamp(), properties);
                self.replace_value(id, merged)
            }
            (EntryAction::Create | EntryAction::Change, EntryAction::Change) => {
                let merged = stored.refreshed(change.timestamp(), change.change_properties());
                self.replace_value(id, merged)
            }
            (EntryAction::Create, EntryAction::Delete) => {
                // A temporary entry: created and deleted between syncs.
                self.clear_node(id, true)
            }
            (EntryAction::Rename | EntryAction::Change, EntryAction::Delete) => {
                self.revert_name(id)?;
                self.clear_children(id)?;
                let merged = stored.into_delete(change.timestamp());
                self.replace_value(id, merged)
            }
            (stored_action, incoming) => Err(Error::invariant(format!(
                "invalid action sequence {stored_action:?} -> {incoming:?} for '{}'",
                change.old_path()
            ))),
        }
    }

    fn set_value(&mut self, id: NodeId, change: EntryChange) -> Result<()> {
        debug_assert!(self.nodes[id].value.is_none());
        self.nodes[id].value = Some(change.clone());
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &mut self.nodes[node_id];
            node.subtree_count = node
                .subtree_count
                .checked_add(1)
                .ok_or_else(|| Error::invariant("subtree count overflow"))?;
            current = node.parent;
        }
        self.push_priority(id, &change);
        Ok(())
    }

    fn replace_value(&mut self, id: NodeId, change: EntryChange) -> Result<()> {
        debug_assert!(self.nodes[id].value.is_some());
        self.nodes[id].value = Some(change.clone());
        self.push_priority(id, &change);
        Ok(())
    }

    /// Raise priorities along the ancestor chain while the new value is
    /// strictly newer than what each node already tracks.
    fn push_priority(&mut self, id: NodeId, change: &EntryChange) {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = &mut self.nodes[node_id];
            match &node.priority_value {
                Some(existing) if !change.is_newer_than(existing) => break,
                _ => node.priority_value = Some(change.clone()),
            }
            current = node.parent;
        }
    }

    fn clear_node(&mut self, id: NodeId, recursive: bool) -> Result<()> {
        if recursive {
            self.clear_children(id)?;
        }
        if self.nodes[id].value.take().is_some() {
            let mut current = Some(id);
            while let Some(node_id) = current {
                let node = &mut self.nodes[node_id];
                node.subtree_count = node
                    .subtree_count
                    .checked_sub(1)
                    .ok_or_else(|| Error::invariant("subtree count went negative"))?;
                current = node.parent;
            }
            self.revert_name(id)?;
        }
        self.prune_and_recompute(id);
        Ok(())
    }

    fn clear_children(&mut self, id: NodeId) -> Result<()> {
        let children: Vec<NodeId> = self.nodes[id].children_by_old_name.values().copied().collect();
        for child in children {
            self.clear_node(child, true)?;
        }
        Ok(())
    }

    /// Detach dangling placeholders upward from `id`, then recompute the
    /// surviving ancestor's priority from its own value and its remaining
    /// children (ties resolve toward the node's own value).
    fn prune_and_recompute(&mut self, id: NodeId) {
        let mut current = id;
        while current != ROOT && self.nodes[current].is_dangling() {
            let Some(parent) = self.nodes[current].parent else {
                break;
            };
            self.detach(current, parent);
            current = parent;
        }
        let mut survivor = Some(current);
        while let Some(node_id) = survivor {
            self.recompute_priority(node_id);
            survivor = self.nodes[node_id].parent;
        }
    }

    fn detach(&mut self, id: NodeId, parent: NodeId) {
        let parent_node = &mut self.nodes[parent];
        parent_node.children_by_name.retain(|_, child| *child != id);
        parent_node
            .children_by_old_name
            .retain(|_, child| *child != id);
        let depth = self.nodes[id].depth;
        if let Some(level) = self.levels.get_mut(depth) {
            level.retain(|&node| node != id);
        }
        self.nodes[id].detached = true;
        trace!("trie pruned dangling node {id}");
    }

    fn recompute_priority(&mut self, id: NodeId) {
        let mut best = self.nodes[id].value.clone();
        let children: Vec<NodeId> = self.nodes[id].children_by_old_name.values().copied().collect();
        for child in children {
            if let Some(candidate) = &self.nodes[child].priority_value {
                let replace = match &best {
                    Some(current) => candidate.is_newer_than(current),
                    None => true,
                };
                if replace {
                    best = Some(candidate.clone());
                }
            }
        }
        self.nodes[id].priority_value = best;
    }

    fn set_name(&mut self, id: NodeId, new_name: &str) -> Result<()> {
        let current_name = self.nodes[id].name.clone();
        if current_name == new_name {
            return Ok(());
        }
        let parent = self.nodes[id]
            .parent
            .ok_or_else(|| Error::invariant("cannot rename the trie root"))?;

        if let Some(&existing) = self.nodes[parent].children_by_name.get(new_name) {
            if existing != id {
                return Err(Error::invariant(format!(
                    "sibling already reachable under name '{new_name}'"
                )));
            }
        }
        let parent_node = &mut self.nodes[parent];
        if parent_node.children_by_name.get(&current_name) == Some(&id) {
            parent_node.children_by_name.remove(&current_name);
        }
        parent_node.children_by_name.insert(new_name.to_string(), id);
        self.nodes[id].name = new_name.to_string();
        Ok(())
    }

    fn revert_name(&mut self, id: NodeId) -> Result<()> {
        let old_name = self.nodes[id].old_name.clone();
        self.set_name(id, &old_name)
    }
}
