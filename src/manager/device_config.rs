// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device configuration types for the device manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::EngineSettings;
use crate::transport::DeviceCredentials;
use crate::types::{ConnectionPolicy, DeviceSerial};

/// Persisted configuration of a managed device.
///
/// Usually deserialized from whatever store the application keeps its
/// device list in.
///
/// # Examples
///
/// ```
/// use applink_lib::manager::DeviceConfig;
/// use applink_lib::transport::{DeviceCredentials, LocalCredentials};
/// use applink_lib::types::ConnectionPolicy;
///
/// let credentials = DeviceCredentials::local(LocalCredentials::new("device-credential", "527"));
/// let config = DeviceConfig::new("XX9-EU-ABC1234A", credentials)
///     .with_policy(ConnectionPolicy::LocalOnly)
///     .with_static_host("192.168.1.40")
///     .with_poll_interval_secs(5);
///
/// let json = serde_json::to_string(&config).unwrap();
/// let parsed: DeviceConfig = serde_json::from_str(&json).unwrap();
/// assert_eq!(parsed, config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device serial.
    pub serial: DeviceSerial,
    /// Transport preference.
    #[serde(default)]
    pub policy: ConnectionPolicy,
    /// Credentials per transport.
    #[serde(default)]
    pub credentials: DeviceCredentials,
    /// Host name or IP of the local broker, skipping discovery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_host: Option<String>,
    /// Override of the `REQUEST-CURRENT-STATE` cadence, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
}

impl DeviceConfig {
    /// Creates a configuration with the default policy.
    #[must_use]
    pub fn new(serial: impl Into<DeviceSerial>, credentials: DeviceCredentials) -> Self {
        Self {
            serial: serial.into(),
            policy: ConnectionPolicy::default(),
            credentials,
            static_host: None,
            poll_interval_secs: None,
        }
    }

    /// Sets the connection policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the static local host.
    #[must_use]
    pub fn with_static_host(mut self, host: impl Into<String>) -> Self {
        self.static_host = Some(host.into());
        self
    }

    /// Sets the state poll interval.
    #[must_use]
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = Some(secs);
        self
    }

    /// Applies the per-device overrides on top of `base`.
    #[must_use]
    pub fn settings(&self, base: &EngineSettings) -> EngineSettings {
        match self.poll_interval_secs {
            Some(secs) => base
                .clone()
                .with_state_poll_interval(Duration::from_secs(secs)),
            None => base.clone(),
        }
    }

    /// Returns the static host if it is not blank.
    #[must_use]
    pub fn static_host(&self) -> Option<&str> {
        self.static_host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
    }
}
