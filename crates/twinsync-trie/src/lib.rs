//! Compressed change trie for TwinSync
//!
//! The change trie aggregates raw file-system events per slash-separated
//! path and collapses redundant sequences: a create followed by a delete
//! vanishes, a cycle of renames cancels out, consecutive content changes
//! merge. Each subtree tracks its most time-relevant pending change (the
//! priority value) so conflict resolution can pick winners in O(1).
//!
//! Nodes live in an arena (`Vec` plus indices) with non-owning parent
//! back-references, and every node stays reachable under both its original
//! and its current name while a rename is pending.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod node;
pub mod trie;

pub use node::{NodeId, NodeRef};
pub use trie::FileSystemTrie;
