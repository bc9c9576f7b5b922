//! Directory snapshot (index tree) for TwinSync
//!
//! The index is the last agreed-upon snapshot of a tree's structure, shared
//! as the diff baseline by both sides of a synchronization. This crate
//! provides:
//!
//! - **Snapshot entries**: file/directory nodes with name, write time, length
//! - **Child collections**: insertion-ordered, kind-partitioned, name-indexed
//! - **Point mutations**: create/rename/change/delete addressed by relative
//!   path, with last-write-time bubbling up every ancestor
//! - **Canonical serialization**: the byte-exact tab-indented text format
//!   persisted to both roots' service folders

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod collection;
pub mod entry;
pub mod serial;
pub mod tree;

pub use collection::{EntryCollection, EntryMut, EntryRef};
pub use entry::{DirectoryEntry, FileEntry, FileSystemEntry};
pub use tree::DirectoryIndex;
