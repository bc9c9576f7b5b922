//! Trie nodes and read-only node views

use crate::FileSystemTrie;
use std::collections::HashMap;
use twinsync_types::{path, EntryChange, EntryType};

/// Index of a node in the trie arena
pub type NodeId = usize;

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) old_name: String,
    pub(crate) name: String,
    pub(crate) entry_type: EntryType,
    pub(crate) parent: Option<NodeId>,
    pub(crate) depth: usize,
    pub(crate) value: Option<EntryChange>,
    pub(crate) priority_value: Option<EntryChange>,
    pub(crate) children_by_name: HashMap<String, NodeId>,
    pub(crate) children_by_old_name: HashMap<String, NodeId>,
    pub(crate) subtree_count: u32,
    pub(crate) detached: bool,
}

impl Node {
    pub(crate) fn new(
        old_name: String,
        entry_type: EntryType,
        parent: Option<NodeId>,
        depth: usize,
    ) -> Self {
        Self {
            name: old_name.clone(),
            old_name,
            entry_type,
            parent,
            depth,
            value: None,
            priority_value: None,
            children_by_name: HashMap::new(),
            children_by_old_name: HashMap::new(),
            subtree_count: 0,
            detached: false,
        }
    }

    pub(crate) fn is_dangling(&self) -> bool {
        self.value.is_none() && self.children_by_old_name.is_empty()
    }
}

/// Read-only view of one trie node
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pub(crate) trie: &'a FileSystemTrie,
    pub(crate) id: NodeId,
}

impl<'a> NodeRef<'a> {
    fn node(&self) -> &'a Node {
        self.trie.node_raw(self.id)
    }

    /// Arena index of this node
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Name the node had when it entered the trie
    pub fn old_name(&self) -> &'a str {
        &self.node().old_name
    }

    /// Current name, diverging from [`Self::old_name`] while a rename is
    /// pending
    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    /// Entry kind this node tracks
    pub fn entry_type(&self) -> EntryType {
        self.node().entry_type
    }

    /// Pending change at this path, if any
    pub fn value(&self) -> Option<&'a EntryChange> {
        self.node().value.as_ref()
    }

    /// Most time-relevant pending change in this subtree
    pub fn priority_value(&self) -> Option<&'a EntryChange> {
        self.node().priority_value.as_ref()
    }

    /// Path depth; top-level entries sit at depth 1
    pub fn depth(&self) -> usize {
        self.node().depth
    }

    /// Number of valued nodes in this subtree
    pub fn subtree_count(&self) -> u32 {
        self.node().subtree_count
    }

    /// Whether this node carries a pending rename beside a non-rename value
    pub fn has_pending_rename(&self) -> bool {
        self.node().name != self.node().old_name
    }

    /// Child lookup, consulting the current-name map first and the old-name
    /// map second: callers may know an entry by either identity.
    pub fn child(&self, name: &str) -> Option<NodeRef<'a>> {
        self.child_by_current_name(name)
            .or_else(|| self.child_by_old_name(name))
    }

    /// Child lookup through the original-name map only
    pub fn child_by_old_name(&self, name: &str) -> Option<NodeRef<'a>> {
        self.node()
            .children_by_old_name
            .get(name)
            .map(|&id| NodeRef {
                trie: self.trie,
                id,
            })
    }

    /// Child lookup through the current-name map only
    pub fn child_by_current_name(&self, name: &str) -> Option<NodeRef<'a>> {
        self.node().children_by_name.get(name).map(|&id| NodeRef {
            trie: self.trie,
            id,
        })
    }

    /// All children, in arena order
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        let mut ids: Vec<NodeId> = self.node().children_by_old_name.values().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .map(|id| NodeRef {
                trie: self.trie,
                id,
            })
            .collect()
    }

    /// Whether the node has any children
    pub fn has_children(&self) -> bool {
        !self.node().children_by_old_name.is_empty()
    }

    /// Path assembled from the original names of this node and its
    /// ancestors; addresses the tree as it was before pending renames.
    pub fn old_path(&self) -> String {
        self.assemble(|node| node.old_name.as_str())
    }

    /// Path assembled from the current names of this node and its ancestors
    pub fn current_path(&self) -> String {
        self.assemble(|node| node.name.as_str())
    }

    fn assemble(&self, pick: impl Fn(&Node) -> &str) -> String {
        let mut segments: Vec<&str> = Vec::new();
        let mut current = Some(self.id);
        while let Some(id) = current {
            let node = self.trie.node_raw(id);
            if node.parent.is_some() {
                segments.push(pick(node));
            }
            current = node.parent;
        }
        segments.reverse();
        let mut out = String::new();
        for segment in segments {
            out = path::join(&out, segment);
        }
        out
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("path", &self.current_path())
            .field("entry_type", &self.entry_type())
            .field("value", &self.value().map(EntryChange::action))
            .finish()
    }
}
