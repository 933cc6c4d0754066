//! The session state map.

use super::delta::{DeltaValue, StateDelta};
use super::operations::apply_delta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map;
use std::collections::HashMap;

/// Key/value state of a session.
///
/// Besides the visible values, a `State` tracks a pending delta: every
/// [`put`](State::put) and [`remove`](State::remove) is recorded there so a
/// caller can mutate a state view and then hand the accumulated change to an
/// event with [`take_delta`](State::take_delta). Deltas applied through
/// [`apply`](State::apply) are not recorded; they are already committed.
///
/// Equality and serialization only consider the visible values.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State {
    values: HashMap<String, Value>,
    #[serde(skip)]
    pending: StateDelta,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from `base` with `delta` applied.
    ///
    /// The delta is also kept as the pending delta, so `has_delta()` reports
    /// whether the construction changed anything worth recording.
    pub fn with_delta(base: HashMap<String, Value>, delta: StateDelta) -> Self {
        let mut values = base;
        apply_delta(&mut values, &delta);
        Self {
            values,
            pending: delta,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, Value> {
        self.values.iter()
    }

    pub fn keys(&self) -> hash_map::Keys<'_, String, Value> {
        self.values.keys()
    }

    pub fn as_map(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        self.values
    }

    /// Set `key` and record the write in the pending delta.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        self.pending.insert(key.clone(), value.clone());
        self.values.insert(key, value)
    }

    /// Remove `key` and record a tombstone in the pending delta.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.pending.tombstone(key);
        self.values.remove(key)
    }

    /// Apply a committed delta in place. Runs in O(|delta|).
    pub fn apply(&mut self, delta: &StateDelta) {
        apply_delta(&mut self.values, delta);
    }

    pub fn has_delta(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn delta(&self) -> &StateDelta {
        &self.pending
    }

    pub fn pending_entry(&self, key: &str) -> Option<&DeltaValue> {
        self.pending.get(key)
    }

    /// Take the pending delta, leaving it empty.
    pub fn take_delta(&mut self) -> StateDelta {
        std::mem::take(&mut self.pending)
    }

    /// A copy of the visible values with no pending delta.
    pub(crate) fn committed(&self) -> Self {
        Self {
            values: self.values.clone(),
            pending: StateDelta::new(),
        }
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl From<HashMap<String, Value>> for State {
    fn from(values: HashMap<String, Value>) -> Self {
        Self {
            values,
            pending: StateDelta::new(),
        }
    }
}

impl FromIterator<(String, Value)> for State {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<HashMap<_, _>>())
    }
}

impl<'a> IntoIterator for &'a State {
    type Item = (&'a String, &'a Value);
    type IntoIter = hash_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
