//! Subscription system for live session changes.
//!
//! This module provides in-process subscriptions to session changes:
//! - Session creation (including overwrites) and deletion
//! - Events committed to a session
//!
//! Subscriptions support:
//! - Filtering by app, user, session, and change kind
//! - Replay of existing sessions before streaming live
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let handle = service.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::user("my-app", "alice"),
//!     ..Default::default()
//! })?;
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SessionChange::EventAppended { event, .. }) => println!("{:?}", event),
//!         Ok(SessionChange::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, SessionChange, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId,
};
