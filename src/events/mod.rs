//! Per-session event log.
//!
//! Events are stored in an append-only log, oldest first. Stored events are
//! never updated, reordered, or removed.

mod log;

pub use log::EventLog;
