//! State deltas carried by events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map;
use std::collections::HashMap;

/// One entry of a state delta.
///
/// Removal is its own variant rather than a reserved JSON value, so any value
/// a caller stores (including `null`) round-trips as an ordinary value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum DeltaValue {
    /// Insert or overwrite the key with this value.
    Value(Value),
    /// Remove the key. Removing an absent key is a no-op.
    Tombstone,
}

impl DeltaValue {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, DeltaValue::Tombstone)
    }
}

impl From<Value> for DeltaValue {
    fn from(value: Value) -> Self {
        DeltaValue::Value(value)
    }
}

/// Partial update to a session's state, keyed by state key.
///
/// Keys are disjoint, so the order entries are applied in does not matter.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDelta(HashMap<String, DeltaValue>);

impl StateDelta {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Builder form of [`StateDelta::insert`].
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder form of [`StateDelta::tombstone`].
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.tombstone(key);
        self
    }

    /// Record a replacement value for `key`, superseding any earlier entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), DeltaValue::Value(value.into()));
    }

    /// Record a removal of `key`, superseding any earlier entry.
    pub fn tombstone(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), DeltaValue::Tombstone);
    }

    pub fn get(&self, key: &str) -> Option<&DeltaValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, DeltaValue> {
        self.0.iter()
    }

    /// Fold `other` into this delta; entries in `other` win per key.
    pub fn extend(&mut self, other: StateDelta) {
        self.0.extend(other.0);
    }
}

impl FromIterator<(String, DeltaValue)> for StateDelta {
    fn from_iter<I: IntoIterator<Item = (String, DeltaValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for StateDelta {
    type Item = (String, DeltaValue);
    type IntoIter = hash_map::IntoIter<String, DeltaValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a StateDelta {
    type Item = (&'a String, &'a DeltaValue);
    type IntoIter = hash_map::Iter<'a, String, DeltaValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
