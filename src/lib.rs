//! # Session Store
//!
//! An in-memory session and event store for stateful agent runtimes.
//!
//! ## Core Concepts
//!
//! - **Sessions**: Conversations scoped to an application and a user, each
//!   with a key/value state
//! - **Events**: Append-only log entries whose state deltas drive the state
//! - **State deltas**: Partial updates where each key is either replaced or
//!   removed by a tombstone
//! - **Registry**: Per-service table owning the live copy of every session
//! - **Change feed**: Subscriptions to session lifecycle and appended events
//!
//! ## Example
//!
//! ```ignore
//! use session_store::{EventInput, InMemorySessionService, SessionService, StateDelta};
//!
//! let service = InMemorySessionService::default();
//! let mut session = service.create_session("my-app", "alice", None, None).await?;
//!
//! // Record an event that updates the state
//! service
//!     .append_event(
//!         &mut session,
//!         EventInput::new("agent").with_state_delta(
//!             StateDelta::new().set("topic", "weather").remove("draft"),
//!         ),
//!     )
//!     .await?;
//!
//! let live = service.get_session("my-app", "alice", &session.id, None).await?;
//! ```

pub mod error;
pub mod events;
pub mod service;
pub mod sessions;
pub mod state;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use events::EventLog;
pub use service::{DetachedAppendPolicy, InMemorySessionService, ServiceConfig, SessionService};
pub use sessions::{AppendOutcome, SessionEntry, SessionRegistry};
pub use state::{merge, DeltaValue, State, StateDelta};
pub use subscriptions::{
    DropReason, SessionChange, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager,
};
pub use types::*;
