// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Registry of devices.
//!
//! The [`DeviceManager`] owns one [`Device`](crate::Device) per serial and
//! shares a single event bus between them. There is no global state: an
//! application that needs several independent fleets creates several
//! managers.
//!
//! # Examples
//!
//! ## Loading persisted devices
//!
//! ```no_run
//! use applink_lib::manager::{DeviceConfig, DeviceManager};
//!
//! # async fn example(saved: &str) -> applink_lib::Result<()> {
//! let manager = DeviceManager::new();
//! let configs: Vec<DeviceConfig> = serde_json::from_str(saved).unwrap_or_default();
//!
//! for config in configs {
//!     let device = manager.add_device(config).await?;
//!     if let Err(e) = manager.connect(device.serial()).await {
//!         eprintln!("{} not reachable yet: {e}", device.serial());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Event Subscription
//!
//! ```no_run
//! use applink_lib::event::DeviceEvent;
//! use applink_lib::manager::DeviceManager;
//!
//! # fn example() {
//! let manager = DeviceManager::new();
//! let mut events = manager.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         match event {
//!             DeviceEvent::StateChanged { serial, changed_keys, .. } => {
//!                 println!("{serial}: {changed_keys:?} changed");
//!             }
//!             DeviceEvent::ConnectionChanged { serial, status, fallback_active } => {
//!                 println!("{serial}: {status} (fallback: {fallback_active})");
//!             }
//!             _ => {}
//!         }
//!     }
//! });
//! # }
//! ```

mod device_config;
mod device_manager;
mod managed_device;

pub use device_config::DeviceConfig;
pub use device_manager::DeviceManager;
