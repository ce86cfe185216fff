// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device serial number.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Serial number identifying a device.
///
/// The serial appears in MQTT topics, is the local broker username and is
/// the key under which the [`DeviceManager`](crate::manager::DeviceManager)
/// stores devices.
///
/// # Examples
///
/// ```
/// use applink_lib::types::DeviceSerial;
///
/// let serial = DeviceSerial::new(" VS9-EU-HJA1234A ");
/// assert_eq!(serial.as_str(), "VS9-EU-HJA1234A");
/// assert_eq!(serial.mdns_host(), "VS9-EU-HJA1234A.local");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceSerial(String);

impl DeviceSerial {
    /// Creates a serial, trimming surrounding whitespace.
    #[must_use]
    pub fn new(serial: impl AsRef<str>) -> Self {
        Self(serial.as_ref().trim().to_string())
    }

    /// Returns the serial as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the serial is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the `<serial>.local` host name used when nothing better is known.
    #[must_use]
    pub fn mdns_host(&self) -> String {
        format!("{}.local", self.0)
    }
}

impl fmt::Debug for DeviceSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceSerial({})", self.0)
    }
}

impl fmt::Display for DeviceSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceSerial {
    fn from(serial: &str) -> Self {
        Self::new(serial)
    }
}

impl From<String> for DeviceSerial {
    fn from(serial: String) -> Self {
        Self::new(serial)
    }
}

impl AsRef<str> for DeviceSerial {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
