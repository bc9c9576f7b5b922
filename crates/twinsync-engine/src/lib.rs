//! Reconciliation engine for TwinSync
//!
//! The synchronizer walks two accumulated deltas against the shared index,
//! classifies per-path conflicts, resolves them through priority rules and a
//! pluggable strategy, and applies the resulting operations to both physical
//! trees under strict precondition checks.
//!
//! A run always completes: one failed path is recorded and skipped, never a
//! reason to abort. Only invariant or conflict-classification errors stop a
//! run, since they mean the tracking structures themselves are inconsistent.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod apply;
pub mod conflict;
pub mod correlate;
pub mod delta;
pub mod engine;

pub use conflict::{
    ConflictSide, ContentsConflict, NamesConflict, PreferNewer, PreferSource, PreferTarget,
    ResolutionChoice, ResolutionStrategy, ResolvedAction,
};
pub use correlate::Correlation;
pub use engine::{FailedChange, PhaseTimings, SyncOptions, SyncReport, Synchronizer};
