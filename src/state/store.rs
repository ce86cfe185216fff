// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Thread-safe state store for one device.

use parking_lot::RwLock;

use super::{FaultDiff, FaultSnapshot, StateChange, StateMap};

/// Canonical state of a single device.
///
/// The store is the single writer of the device's control state,
/// environmental readings and fault dump. Every mutation happens under one
/// write lock, so concurrent readers never observe a half-applied merge.
/// Reads return owned copies.
///
/// Keys are never removed except by [`apply_snapshot`](Self::apply_snapshot)
/// with a map that omits them. Deltas only add or overwrite.
#[derive(Debug, Default)]
pub struct StateStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    state: StateMap,
    environment: StateMap,
    faults: FaultSnapshot,
}

impl StateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a state change.
    ///
    /// Returns the keys whose value changed, appeared or (for snapshots)
    /// disappeared, in ascending order. An empty result means the change was
    /// a no-op.
    pub fn apply(&self, change: &StateChange) -> Vec<String> {
        match change {
            StateChange::Snapshot(values) => self.apply_snapshot(values.clone()),
            StateChange::Delta(values) => self.apply_delta(values),
            StateChange::Environment(values) => self.apply_environment(values),
        }
    }

    /// Replaces the control state with an authoritative snapshot.
    pub fn apply_snapshot(&self, values: StateMap) -> Vec<String> {
        let mut inner = self.inner.write();
        let previous = std::mem::replace(&mut inner.state, values);

        let mut changed: Vec<String> = previous
            .iter()
            .filter(|(key, value)| inner.state.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        changed.extend(
            inner
                .state
                .keys()
                .filter(|key| !previous.contains_key(*key))
                .cloned(),
        );
        changed.sort_unstable();
        changed
    }

    /// Merges a partial update into the control state.
    pub fn apply_delta(&self, values: &StateMap) -> Vec<String> {
        merge(&mut self.inner.write().state, values)
    }

    /// Merges a partial update into the environmental readings.
    pub fn apply_environment(&self, values: &StateMap) -> Vec<String> {
        merge(&mut self.inner.write().environment, values)
    }

    /// Replaces the fault dump and returns the transitions from the previous one.
    pub fn apply_fault_snapshot(&self, faults: FaultSnapshot) -> FaultDiff {
        let mut inner = self.inner.write();
        let diff = inner.faults.diff(&faults);
        inner.faults = faults;
        diff
    }

    /// Returns a copy of the control state.
    #[must_use]
    pub fn snapshot(&self) -> StateMap {
        self.inner.read().state.clone()
    }

    /// Returns a copy of the environmental readings.
    #[must_use]
    pub fn environment(&self) -> StateMap {
        self.inner.read().environment.clone()
    }

    /// Returns a copy of the latest fault dump.
    #[must_use]
    pub fn faults(&self) -> FaultSnapshot {
        self.inner.read().faults.clone()
    }

    /// Returns the current value of a control key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().state.get(key).cloned()
    }
}

/// Inserts every value of `values` into `target`, returning the keys that changed.
fn merge(target: &mut StateMap, values: &StateMap) -> Vec<String> {
    values
        .iter()
        .filter_map(|(key, value)| {
            let previous = target.insert(key.clone(), value.clone());
            (previous.as_ref() != Some(value)).then(|| key.clone())
        })
        .collect()
}
