//! Session state and delta application.
//!
//! A session's state is a flat map from string keys to JSON values. Events
//! mutate it through [`StateDelta`]s: each entry either replaces a key's value
//! or carries a [`DeltaValue::Tombstone`] that removes the key.

mod delta;
mod map;
mod operations;

pub use delta::{DeltaValue, StateDelta};
pub use map::State;
pub use operations::merge;
