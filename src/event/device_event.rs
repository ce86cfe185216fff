// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device event types.

use serde::{Deserialize, Serialize};

use crate::state::{FaultDiff, StateMap};
use crate::types::{ConnectionStatus, DeviceSerial};

/// Events emitted by devices and the device manager.
///
/// Every event names the serial of the device it concerns. State events
/// carry a full copy of the new map next to the keys that changed, so
/// consumers never need to call back into the device.
///
/// # Examples
///
/// ```
/// use applink_lib::event::DeviceEvent;
/// use applink_lib::types::{ConnectionStatus, DeviceSerial};
///
/// let serial = DeviceSerial::new("XX9-EU-ABC1234A");
/// let event = DeviceEvent::ConnectionChanged {
///     serial: serial.clone(),
///     status: ConnectionStatus::Cloud,
///     fallback_active: true,
/// };
/// assert!(event.is_connection());
/// assert_eq!(event.serial(), &serial);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A device was added to the manager.
    DeviceAdded {
        /// Serial of the added device.
        serial: DeviceSerial,
    },

    /// A device was removed from the manager.
    DeviceRemoved {
        /// Serial of the removed device.
        serial: DeviceSerial,
    },

    /// The control state changed.
    StateChanged {
        /// Serial of the device.
        serial: DeviceSerial,
        /// The complete new state.
        state: StateMap,
        /// Keys that changed, appeared or disappeared.
        changed_keys: Vec<String>,
    },

    /// The environmental readings changed.
    EnvironmentChanged {
        /// Serial of the device.
        serial: DeviceSerial,
        /// The complete new readings.
        environment: StateMap,
        /// Keys that changed.
        changed_keys: Vec<String>,
    },

    /// Fault codes started or stopped failing.
    FaultsChanged {
        /// Serial of the device.
        serial: DeviceSerial,
        /// Transitions since the previous fault dump.
        diff: FaultDiff,
    },

    /// The live transport changed.
    ConnectionChanged {
        /// Serial of the device.
        serial: DeviceSerial,
        /// New connection status.
        status: ConnectionStatus,
        /// Connected through the non-preferred mode.
        fallback_active: bool,
    },

    /// A whole attempt cycle failed. The engine keeps retrying.
    ConnectionFailed {
        /// Serial of the device.
        serial: DeviceSerial,
        /// Error of the last attempt.
        error: String,
        /// Failed cycles since the last successful connect.
        consecutive_failures: u32,
    },

    /// The device cannot be driven by this library. The engine has stopped.
    Unsupported {
        /// Serial of the device.
        serial: DeviceSerial,
        /// Why the device was rejected.
        reason: String,
    },

    /// A well-formed message of a type this library does not interpret.
    MessageReceived {
        /// Serial of the device.
        serial: DeviceSerial,
        /// The `msg` value.
        kind: String,
    },
}

impl DeviceEvent {
    /// Returns the serial of the device this event concerns.
    #[must_use]
    pub fn serial(&self) -> &DeviceSerial {
        match self {
            Self::DeviceAdded { serial }
            | Self::DeviceRemoved { serial }
            | Self::StateChanged { serial, .. }
            | Self::EnvironmentChanged { serial, .. }
            | Self::FaultsChanged { serial, .. }
            | Self::ConnectionChanged { serial, .. }
            | Self::ConnectionFailed { serial, .. }
            | Self::Unsupported { serial, .. }
            | Self::MessageReceived { serial, .. } => serial,
        }
    }

    /// Returns `true` if this is a device lifecycle event (added/removed).
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::DeviceAdded { .. } | Self::DeviceRemoved { .. })
    }

    /// Returns `true` if this is a connection event.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Self::ConnectionChanged { .. } | Self::ConnectionFailed { .. } | Self::Unsupported { .. }
        )
    }

    /// Returns `true` if this event reports new control or environmental state.
    #[must_use]
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            Self::StateChanged { .. } | Self::EnvironmentChanged { .. }
        )
    }
}
