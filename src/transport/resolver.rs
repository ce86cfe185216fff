// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local host resolution.

use crate::types::DeviceSerial;

/// Network discovery lookup supplied by the caller, e.g. an mDNS browser.
///
/// Closures of type `Fn(&DeviceSerial) -> Option<String>` implement this
/// trait.
pub trait HostResolver: Send + Sync {
    /// Returns the last known host of the device, if discovery has seen it.
    fn lookup(&self, serial: &DeviceSerial) -> Option<String>;
}

impl<F> HostResolver for F
where
    F: Fn(&DeviceSerial) -> Option<String> + Send + Sync,
{
    fn lookup(&self, serial: &DeviceSerial) -> Option<String> {
        self(serial)
    }
}

/// Picks the local broker host for one attempt.
///
/// A static host wins, then a discovery hit, then `{serial}.local`.
///
/// # Examples
///
/// ```
/// use applink_lib::transport::resolve_local_host;
/// use applink_lib::types::DeviceSerial;
///
/// let serial = DeviceSerial::new("AB1-EU-CDE");
/// assert_eq!(resolve_local_host(Some("10.0.0.9"), None, &serial), "10.0.0.9");
/// assert_eq!(resolve_local_host(None, None, &serial), "AB1-EU-CDE.local");
/// ```
#[must_use]
pub fn resolve_local_host(
    static_host: Option<&str>,
    resolver: Option<&dyn HostResolver>,
    serial: &DeviceSerial,
) -> String {
    if let Some(host) = static_host.map(str::trim).filter(|h| !h.is_empty()) {
        return host.to_string();
    }
    if let Some(host) = resolver
        .and_then(|r| r.lookup(serial))
        .filter(|h| !h.trim().is_empty())
    {
        tracing::debug!(serial = %serial, host = %host, "Resolved device host via discovery");
        return host;
    }
    serial.mdns_host()
}
