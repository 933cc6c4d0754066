//! Session registry.
//!
//! The registry owns every live session. Membership lives in one map guarded
//! by a reader-writer lock that is held only for lookups and membership
//! changes; each session's state and event log sit behind the session's own
//! lock, so work on one session never blocks another.

mod registry;

pub use registry::{AppendOutcome, SessionEntry, SessionRegistry};
