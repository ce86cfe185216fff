// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport modes and the connection status indicator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A transport through which a device can be reached.
///
/// # Examples
///
/// ```
/// use applink_lib::types::ConnectionMode;
///
/// assert_eq!(ConnectionMode::Local.other(), ConnectionMode::Cloud);
/// assert_eq!(ConnectionMode::Cloud.as_str(), "cloud");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Direct MQTT to the broker running on the device.
    Local,
    /// MQTT over the vendor WebSocket proxy.
    Cloud,
}

impl ConnectionMode {
    /// Returns the other transport.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Local => Self::Cloud,
            Self::Cloud => Self::Local,
        }
    }

    /// Returns a lowercase name suitable for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection status as surfaced to external status consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Connected through the local broker.
    Local,
    /// Connected through the cloud proxy.
    Cloud,
    /// No transport is connected.
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    /// Returns the connected mode, if any.
    #[must_use]
    pub const fn mode(self) -> Option<ConnectionMode> {
        match self {
            Self::Local => Some(ConnectionMode::Local),
            Self::Cloud => Some(ConnectionMode::Cloud),
            Self::Disconnected => None,
        }
    }

    /// Returns `true` unless disconnected.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl From<ConnectionMode> for ConnectionStatus {
    fn from(mode: ConnectionMode) -> Self {
        match mode {
            ConnectionMode::Local => Self::Local,
            ConnectionMode::Cloud => Self::Cloud,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Cloud => f.write_str("Cloud"),
            Self::Disconnected => f.write_str("Disconnected"),
        }
    }
}
