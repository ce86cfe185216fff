// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback management for device subscriptions.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`CallbackRegistry`] - Registry storing and dispatching callbacks

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::event::DeviceEvent;
use crate::state::{FaultDiff, StateMap};
use crate::types::ConnectionStatus;

/// Unique identifier for a subscription.
///
/// Returned when registering a callback and used to unsubscribe it later.
/// IDs are unique within a device's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type StateCallback = Arc<dyn Fn(&StateMap, &[String]) + Send + Sync>;
type EnvironmentCallback = Arc<dyn Fn(&StateMap) + Send + Sync>;
type FaultsCallback = Arc<dyn Fn(&FaultDiff) + Send + Sync>;
type ConnectionCallback = Arc<dyn Fn(ConnectionStatus, bool) + Send + Sync>;
type EventCallback = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

/// Registry of per-device callbacks.
///
/// Callbacks run synchronously on the device's engine task, in arbitrary
/// order. They must return quickly; long work belongs on a task fed by the
/// [`EventBus`](crate::event::EventBus).
pub struct CallbackRegistry {
    next_id: AtomicU64,
    state_callbacks: RwLock<HashMap<SubscriptionId, StateCallback>>,
    environment_callbacks: RwLock<HashMap<SubscriptionId, EnvironmentCallback>>,
    faults_callbacks: RwLock<HashMap<SubscriptionId, FaultsCallback>>,
    connection_callbacks: RwLock<HashMap<SubscriptionId, ConnectionCallback>>,
    event_callbacks: RwLock<HashMap<SubscriptionId, EventCallback>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            state_callbacks: RwLock::new(HashMap::new()),
            environment_callbacks: RwLock::new(HashMap::new()),
            faults_callbacks: RwLock::new(HashMap::new()),
            connection_callbacks: RwLock::new(HashMap::new()),
            event_callbacks: RwLock::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers a callback receiving the new control state and the changed keys.
    pub fn on_state_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateMap, &[String]) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.state_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback receiving the new environmental readings.
    pub fn on_environment_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateMap) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.environment_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback receiving fault transitions.
    pub fn on_faults_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FaultDiff) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.faults_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback receiving the connection status and fallback flag.
    pub fn on_connection_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ConnectionStatus, bool) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.connection_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback receiving every event of the device.
    pub fn on_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.event_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    // =========================================================================
    // Unsubscription
    // =========================================================================

    /// Unregisters a callback. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state_callbacks.write().remove(&id).is_some()
            || self.environment_callbacks.write().remove(&id).is_some()
            || self.faults_callbacks.write().remove(&id).is_some()
            || self.connection_callbacks.write().remove(&id).is_some()
            || self.event_callbacks.write().remove(&id).is_some()
    }

    /// Clears all callbacks.
    pub fn clear(&self) {
        self.state_callbacks.write().clear();
        self.environment_callbacks.write().clear();
        self.faults_callbacks.write().clear();
        self.connection_callbacks.write().clear();
        self.event_callbacks.write().clear();
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Calls every callback interested in `event`.
    ///
    /// Callbacks run after the registry locks are released, so a callback
    /// may register or unsubscribe callbacks of the same registry.
    pub fn dispatch(&self, event: &DeviceEvent) {
        for callback in snapshot(&self.event_callbacks) {
            callback(event);
        }

        match event {
            DeviceEvent::StateChanged {
                state,
                changed_keys,
                ..
            } => {
                for callback in snapshot(&self.state_callbacks) {
                    callback(state, changed_keys);
                }
            }
            DeviceEvent::EnvironmentChanged { environment, .. } => {
                for callback in snapshot(&self.environment_callbacks) {
                    callback(environment);
                }
            }
            DeviceEvent::FaultsChanged { diff, .. } => {
                for callback in snapshot(&self.faults_callbacks) {
                    callback(diff);
                }
            }
            DeviceEvent::ConnectionChanged {
                status,
                fallback_active,
                ..
            } => {
                for callback in snapshot(&self.connection_callbacks) {
                    callback(*status, *fallback_active);
                }
            }
            DeviceEvent::DeviceAdded { .. }
            | DeviceEvent::DeviceRemoved { .. }
            | DeviceEvent::ConnectionFailed { .. }
            | DeviceEvent::Unsupported { .. }
            | DeviceEvent::MessageReceived { .. } => {
                // Only reach `on_event` callbacks.
            }
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Returns the total number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.state_callbacks.read().len()
            + self.environment_callbacks.read().len()
            + self.faults_callbacks.read().len()
            + self.connection_callbacks.read().len()
            + self.event_callbacks.read().len()
    }

    /// Returns `true` if there are no registered callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback_count() == 0
    }
}

/// Copies the callbacks out so none runs under the lock.
fn snapshot<T: Clone>(callbacks: &RwLock<HashMap<SubscriptionId, T>>) -> Vec<T> {
    callbacks.read().values().cloned().collect()
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceSerial;
    use std::sync::atomic::AtomicU32;

    fn serial() -> DeviceSerial {
        DeviceSerial::new("S1")
    }

    fn state_event(keys: &[&str]) -> DeviceEvent {
        DeviceEvent::StateChanged {
            serial: serial(),
            state: keys
                .iter()
                .map(|k| ((*k).to_string(), "ON".to_string()))
                .collect(),
            changed_keys: keys.iter().map(|k| (*k).to_string()).collect(),
        }
    }

    #[test]
    fn subscription_id_display() {
        assert_eq!(SubscriptionId::new(42).to_string(), "Sub(42)");
        assert_eq!(SubscriptionId::new(7).value(), 7);
    }

    #[test]
    fn state_callback_and_unsubscribe() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let id = registry.on_state_changed(move |state, keys| {
            assert_eq!(state.len(), keys.len());
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(registry.callback_count(), 1);

        registry.dispatch(&state_event(&["fpwr", "oson"]));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.dispatch(&state_event(&["fpwr"]));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_callback_receives_fallback_flag() {
        let registry = CallbackRegistry::new();
        let received = Arc::new(RwLock::new(None));
        let received_clone = Arc::clone(&received);

        registry.on_connection_changed(move |status, fallback| {
            *received_clone.write() = Some((status, fallback));
        });
        registry.dispatch(&DeviceEvent::ConnectionChanged {
            serial: serial(),
            status: ConnectionStatus::Cloud,
            fallback_active: true,
        });

        assert_eq!(*received.read(), Some((ConnectionStatus::Cloud, true)));
    }

    #[test]
    fn typed_callbacks_only_see_their_events() {
        let registry = CallbackRegistry::new();
        let faults = Arc::new(AtomicU32::new(0));
        let all = Arc::new(AtomicU32::new(0));
        let (f, a) = (Arc::clone(&faults), Arc::clone(&all));

        registry.on_faults_changed(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        registry.on_event(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });

        registry.dispatch(&state_event(&["fpwr"]));
        registry.dispatch(&DeviceEvent::FaultsChanged {
            serial: serial(),
            diff: FaultDiff::default(),
        });
        registry.dispatch(&DeviceEvent::MessageReceived {
            serial: serial(),
            kind: "HELLO".to_string(),
        });

        assert_eq!(faults.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let registry = Arc::new(CallbackRegistry::new());
        let calls = Arc::new(AtomicU32::new(0));
        let own_id = Arc::new(RwLock::new(None::<SubscriptionId>));

        let id = registry.on_connection_changed({
            let registry = Arc::clone(&registry);
            let calls = Arc::clone(&calls);
            let own_id = Arc::clone(&own_id);
            move |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *own_id.read() {
                    assert!(registry.unsubscribe(id));
                }
                registry.on_event(|_| {});
            }
        });
        *own_id.write() = Some(id);

        let event = DeviceEvent::ConnectionChanged {
            serial: serial(),
            status: ConnectionStatus::Local,
            fallback_active: false,
        };
        registry.dispatch(&event);
        registry.dispatch(&event);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.callback_count(), 1);
    }

    #[test]
    fn clear_and_unique_ids() {
        let registry = CallbackRegistry::new();
        let id1 = registry.on_environment_changed(|_| {});
        let id2 = registry.on_connection_changed(|_, _| {});
        assert_ne!(id1, id2);

        registry.clear();
        assert!(registry.is_empty());
        assert!(format!("{registry:?}").contains("callback_count"));
    }
}
