// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the library.
//!
//! # Types
//!
//! - [`ConnectionMode`] - The two transports a device can be reached through
//! - [`ConnectionStatus`] - Diagnostic indicator: Local, Cloud or Disconnected
//! - [`ConnectionPolicy`] - User choice of preferred transport and fallback
//! - [`DeviceSerial`] - Device serial number, the identity of a device

mod mode;
mod policy;
mod serial;

pub use mode::{ConnectionMode, ConnectionStatus};
pub use policy::ConnectionPolicy;
pub use serial::DeviceSerial;
