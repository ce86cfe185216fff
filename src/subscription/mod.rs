// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback subscriptions for device events.
//!
//! - [`SubscriptionId`] - Identifier of a subscription, used to unsubscribe
//! - [`CallbackRegistry`] - Stores callbacks and dispatches events to them
//! - [`Subscribable`] - Trait for types that support callback subscriptions
//!
//! Callbacks complement the [`EventBus`](crate::event::EventBus): the bus
//! suits async consumers, callbacks suit quick synchronous reactions.
//!
//! ```no_run
//! use applink_lib::Device;
//! use applink_lib::subscription::Subscribable;
//!
//! let device = Device::builder("XX9-EU-ABC1234A").build();
//!
//! let sub_id = device.on_faults_changed(|diff| {
//!     for fault in diff.newly_failing() {
//!         println!("{} {} failing", fault.section, fault.code);
//!     }
//! });
//!
//! device.unsubscribe(sub_id);
//! ```

mod callback;
mod subscribable;

pub use callback::{CallbackRegistry, SubscriptionId};
pub use subscribable::Subscribable;
