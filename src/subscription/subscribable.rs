// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscribable trait for types that report device events.

use crate::event::DeviceEvent;
use crate::state::{FaultDiff, StateMap};
use crate::subscription::SubscriptionId;
use crate::types::ConnectionStatus;

/// Trait for types that support callback subscriptions.
///
/// # Examples
///
/// ```no_run
/// use applink_lib::Device;
/// use applink_lib::subscription::Subscribable;
///
/// let device = Device::builder("XX9-EU-ABC1234A").build();
///
/// let sub_id = device.on_state_changed(|state, changed| {
///     println!("{changed:?} changed, fan speed is {:?}", state.get("fnsp"));
/// });
///
/// device.on_connection_changed(|status, fallback| {
///     println!("now {status} (fallback: {fallback})");
/// });
///
/// // Unsubscribe when no longer needed
/// device.unsubscribe(sub_id);
/// ```
pub trait Subscribable {
    /// Subscribes to control state changes.
    ///
    /// The callback receives the complete new state and the keys that changed.
    fn on_state_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateMap, &[String]) + Send + Sync + 'static;

    /// Subscribes to environmental reading changes.
    fn on_environment_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateMap) + Send + Sync + 'static;

    /// Subscribes to fault transitions.
    fn on_faults_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FaultDiff) + Send + Sync + 'static;

    /// Subscribes to connection status changes.
    ///
    /// The callback receives the new status and whether the link is a fallback.
    fn on_connection_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ConnectionStatus, bool) + Send + Sync + 'static;

    /// Subscribes to every event of the device.
    fn on_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static;

    /// Unsubscribes a callback by its subscription ID.
    ///
    /// Returns `true` if the subscription was found and removed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
