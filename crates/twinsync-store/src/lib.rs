//! Durable storage for TwinSync
//!
//! Two small persistence concerns live here:
//!
//! - [`EventLog`]: the append-only record of observed changes on a tracked
//!   root, consumed transactionally by each synchronization run
//! - [`SyncHistory`]: the single persisted fact of when the last successful
//!   sync finished
//!
//! Both are plain files inside a root's service folder, written with
//! line-oriented JSON and the fixed wire timestamp format so they stay
//! inspectable with ordinary tools.

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod history;
pub mod log;

pub use history::SyncHistory;
pub use log::EventLog;
