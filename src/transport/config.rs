// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport configurations and device credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::LOCAL_PORT;
use crate::types::{ConnectionMode, DeviceSerial};

const REDACTED: &str = "<redacted>";

/// Configuration of a single connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// On-device broker on the LAN.
    Local(LocalConfig),
    /// Vendor cloud proxy.
    Cloud(CloudConfig),
}

impl TransportConfig {
    /// Returns the connection mode of this configuration.
    #[must_use]
    pub fn mode(&self) -> ConnectionMode {
        match self {
            Self::Local(_) => ConnectionMode::Local,
            Self::Cloud(_) => ConnectionMode::Cloud,
        }
    }

    /// Returns the root segment of the device topics.
    #[must_use]
    pub fn root_topic(&self) -> &str {
        match self {
            Self::Local(local) => &local.root_topic,
            Self::Cloud(cloud) => &cloud.root_topic,
        }
    }
}

/// Local broker settings, resolved for one attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Hostname or IP address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// MQTT username, the device serial.
    pub username: String,
    /// MQTT password, the device credential.
    pub password: String,
    /// Root topic segment.
    pub root_topic: String,
}

impl LocalConfig {
    /// Creates a configuration on the default port.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        root_topic: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: LOCAL_PORT,
            username: username.into(),
            password: password.into(),
            root_topic: root_topic.into(),
        }
    }

    /// Sets the broker port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }
}

impl fmt::Debug for LocalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("root_topic", &self.root_topic)
            .finish()
    }
}

fn default_broker_type() -> String {
    "wss".to_string()
}

fn default_authorizer_name() -> String {
    "CustomAuthorizer".to_string()
}

fn default_token_key() -> String {
    "token".to_string()
}

/// Cloud proxy settings.
///
/// Obtained by the caller from the vendor account API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Proxy hostname, without scheme or port.
    pub endpoint: String,
    /// MQTT client id assigned by the vendor.
    pub client_id: String,
    /// Authorizer token.
    pub token_value: String,
    /// Signature of the token.
    pub token_signature: String,
    /// Root topic segment.
    pub root_topic: String,
    /// Broker type reported by the vendor. Only `wss` is supported.
    #[serde(default = "default_broker_type")]
    pub broker_type: String,
    /// Name of the custom authorizer the proxy routes the token to.
    #[serde(default = "default_authorizer_name")]
    pub authorizer_name: String,
    /// Query parameter carrying the token value.
    #[serde(default = "default_token_key")]
    pub token_key: String,
}

impl CloudConfig {
    /// Creates a `wss` configuration with the default authorizer.
    #[must_use]
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        token_value: impl Into<String>,
        token_signature: impl Into<String>,
        root_topic: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            token_value: token_value.into(),
            token_signature: token_signature.into(),
            root_topic: root_topic.into(),
            broker_type: default_broker_type(),
            authorizer_name: default_authorizer_name(),
            token_key: default_token_key(),
        }
    }
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("token_value", &REDACTED)
            .field("token_signature", &REDACTED)
            .field("root_topic", &self.root_topic)
            .field("broker_type", &self.broker_type)
            .finish_non_exhaustive()
    }
}

fn default_local_port() -> u16 {
    LOCAL_PORT
}

/// Long-lived local credentials, before host resolution.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalCredentials {
    /// Device credential used as the MQTT password.
    pub credential: String,
    /// Root topic segment, usually the product type code.
    pub root_topic: String,
    /// Broker port.
    #[serde(default = "default_local_port")]
    pub port: u16,
}

impl LocalCredentials {
    /// Creates local credentials on the default port.
    #[must_use]
    pub fn new(credential: impl Into<String>, root_topic: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            root_topic: root_topic.into(),
            port: LOCAL_PORT,
        }
    }

    /// Builds the configuration of one attempt against `host`.
    #[must_use]
    pub fn to_config(&self, host: impl Into<String>, serial: &DeviceSerial) -> LocalConfig {
        LocalConfig::new(host, serial.as_str(), &self.credential, &self.root_topic)
            .with_port(self.port)
    }
}

impl fmt::Debug for LocalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalCredentials")
            .field("credential", &REDACTED)
            .field("root_topic", &self.root_topic)
            .field("port", &self.port)
            .finish()
    }
}

/// Everything needed to reach a device in either mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    /// Local broker credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalCredentials>,
    /// Cloud proxy credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<CloudConfig>,
}

impl DeviceCredentials {
    /// Credentials for the local broker only.
    #[must_use]
    pub fn local(local: LocalCredentials) -> Self {
        Self {
            local: Some(local),
            cloud: None,
        }
    }

    /// Credentials for the cloud proxy only.
    #[must_use]
    pub fn cloud(cloud: CloudConfig) -> Self {
        Self {
            local: None,
            cloud: Some(cloud),
        }
    }

    /// Adds cloud credentials.
    #[must_use]
    pub fn with_cloud(mut self, cloud: CloudConfig) -> Self {
        self.cloud = Some(cloud);
        self
    }

    /// Adds local credentials.
    #[must_use]
    pub fn with_local(mut self, local: LocalCredentials) -> Self {
        self.local = Some(local);
        self
    }

    /// Returns `true` if credentials for `mode` are present.
    #[must_use]
    pub fn supports(&self, mode: ConnectionMode) -> bool {
        match mode {
            ConnectionMode::Local => self.local.is_some(),
            ConnectionMode::Cloud => self.cloud.is_some(),
        }
    }
}
