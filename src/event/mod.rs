// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for device state and connection changes.
//!
//! The [`EventBus`] uses tokio's broadcast channel so any number of
//! consumers can follow one or many devices. A [`DeviceManager`] shares a
//! single bus between all devices it owns.
//!
//! [`DeviceManager`]: crate::manager::DeviceManager
//!
//! # Examples
//!
//! ```
//! use applink_lib::event::{DeviceEvent, EventBus};
//! use applink_lib::types::DeviceSerial;
//!
//! let bus = EventBus::new();
//!
//! // Subscribe to events
//! let mut rx = bus.subscribe();
//!
//! // Publish an event
//! bus.publish(DeviceEvent::DeviceAdded {
//!     serial: DeviceSerial::new("XX9-EU-ABC1234A"),
//! });
//! ```

mod device_event;
mod event_bus;

pub use device_event::DeviceEvent;
pub use event_bus::{DeviceReceiver, EventBus};
