// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `AppLink` Lib - keep a live view of connected home appliances.
//!
//! This library connects to appliances over MQTT, either directly through
//! the broker running on the device (local) or through the vendor's cloud
//! proxy, and keeps an up-to-date copy of their state.
//!
//! # Supported Features
//!
//! - **Resilient connections**: local retry before fallback, background
//!   reconnect, periodic return to the preferred transport, manual override
//! - **State tracking**: control state, environmental readings and fault
//!   codes, merged from snapshots and partial updates
//! - **Commands**: multi-field `STATE-SET` commands in a single publish
//! - **Events**: callbacks, a broadcast bus and a connection watch channel
//!
//! # Connection Policies
//!
//! | Policy | First attempt | Fallback |
//! |--------|---------------|----------|
//! | `LocalOnly` | local | none |
//! | `LocalWithCloudFallback` | local | cloud |
//! | `CloudWithLocalFallback` | cloud | local |
//! | `CloudOnly` | cloud | none |
//!
//! # Quick Start
//!
//! ```no_run
//! use applink_lib::Device;
//! use applink_lib::command::CommandRequest;
//! use applink_lib::subscription::Subscribable;
//! use applink_lib::transport::{CloudConfig, DeviceCredentials, LocalCredentials};
//! use applink_lib::types::ConnectionPolicy;
//!
//! #[tokio::main]
//! async fn main() -> applink_lib::Result<()> {
//!     let device = Device::builder("XX9-EU-ABC1234A")
//!         .static_host("192.168.1.40")
//!         .build();
//!
//!     device.on_connection_changed(|status, fallback| {
//!         println!("connection: {status} (fallback: {fallback})");
//!     });
//!
//!     let credentials = DeviceCredentials::local(LocalCredentials::new("device-credential", "527"))
//!         .with_cloud(CloudConfig::new(
//!             "a1b2c3-ats.iot.eu-west-1.amazonaws.com",
//!             "client-id",
//!             "token",
//!             "signature",
//!             "527",
//!         ));
//!     device
//!         .connect(ConnectionPolicy::LocalWithCloudFallback, credentials)
//!         .await?;
//!
//!     // Power on and set the fan speed in one message
//!     let command = CommandRequest::new()
//!         .set_switch("fpwr", true)
//!         .set_number("fnsp", 4, 4);
//!     device.send_command(&command).await?;
//!
//!     println!("state: {:?}", device.state());
//!     device.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod connection;
mod device;
pub mod error;
pub mod event;
pub mod manager;
pub mod polling;
pub mod protocol;
pub mod state;
pub mod subscription;
pub mod transport;
pub mod types;

pub use command::{Command, CommandRequest, PollRequest};
pub use connection::{ConnectionState, EngineSettings};
pub use device::{Device, DeviceBuilder};
pub use error::{CommandError, Error, ParseError, Result, TransportError};
pub use event::{DeviceEvent, EventBus};
pub use manager::{DeviceConfig, DeviceManager};
pub use state::{FaultDiff, FaultSnapshot, StateMap};
pub use subscription::{CallbackRegistry, Subscribable, SubscriptionId};
pub use types::{ConnectionMode, ConnectionPolicy, ConnectionStatus, DeviceSerial};
