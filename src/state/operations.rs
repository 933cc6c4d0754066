//! Delta application.

use super::delta::{DeltaValue, StateDelta};
use super::map::State;
use serde_json::Value;
use std::collections::HashMap;

/// Merge `delta` into a copy of `base`.
///
/// For every key in the delta, a tombstone removes the key and a value
/// inserts or overwrites it. Keys the delta does not mention are untouched.
/// The merge never fails, whether or not the targeted keys exist.
pub fn merge(base: &State, delta: &StateDelta) -> State {
    let mut merged = base.committed();
    merged.apply(delta);
    merged
}

/// Apply `delta` to `values` in place, touching only the delta's keys.
pub(crate) fn apply_delta(values: &mut HashMap<String, Value>, delta: &StateDelta) {
    for (key, change) in delta {
        match change {
            DeltaValue::Tombstone => {
                values.remove(key);
            }
            DeltaValue::Value(value) => {
                values.insert(key.clone(), value.clone());
            }
        }
    }
}
