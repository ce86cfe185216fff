// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker transports.
//!
//! A [`Connector`] turns a [`TransportConfig`] into a live [`Connection`]:
//! a [`Transport`] handle for outgoing traffic and a bounded receiver of
//! incoming [`Frame`]s. Two configurations exist:
//!
//! | Mode | Broker | Authentication |
//! |------|--------|----------------|
//! | Local | `{host}:1883`, plain TCP | username = serial, password = device credential |
//! | Cloud | `wss://{endpoint}:443/mqtt` | token and signature as URL query parameters |
//!
//! [`MqttConnector`] implements both on top of `rumqttc`. The network read
//! loop never waits on the frame queue: when the queue is full, frames are
//! dropped with a warning.

mod cloud;
mod config;
mod local;
mod resolver;
mod session;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::time::Duration;

pub use config::{CloudConfig, DeviceCredentials, LocalConfig, LocalCredentials, TransportConfig};
pub use resolver::{HostResolver, resolve_local_host};
pub use session::MqttSession;

use tokio::sync::mpsc;

use crate::error::TransportError;

/// Default MQTT port of the on-device broker.
pub const LOCAL_PORT: u16 = 1883;

/// A message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// A live link to a broker.
pub trait Transport: Send + Sync + 'static {
    /// Publishes a payload on `topic`.
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Subscribes to `topic`.
    fn subscribe(&self, topic: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Resolves once the link is lost or closed.
    fn closed(&self) -> impl Future<Output = ()> + Send;

    /// Closes the link. Further calls are no-ops.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// A freshly established connection.
#[derive(Debug)]
pub struct Connection<T> {
    /// Handle for outgoing traffic.
    pub transport: T,
    /// Incoming messages.
    pub frames: mpsc::Receiver<Frame>,
}

/// Establishes transports from configurations.
pub trait Connector: Send + Sync + 'static {
    /// The transport produced by this connector.
    type Transport: Transport;

    /// Connects and waits for the broker to accept the session.
    ///
    /// Dropping the returned future before it completes tears the partly
    /// opened connection down.
    fn connect(
        &self,
        config: &TransportConfig,
    ) -> impl Future<Output = Result<Connection<Self::Transport>, TransportError>> + Send;
}

/// `rumqttc` backed connector for both local and cloud brokers.
///
/// # Examples
///
/// ```no_run
/// use applink_lib::transport::{Connector, LocalConfig, MqttConnector, TransportConfig};
///
/// # async fn example() -> Result<(), applink_lib::error::TransportError> {
/// let config = TransportConfig::Local(LocalConfig::new(
///     "192.168.1.40",
///     "XX9-EU-ABC1234A",
///     "device-credential",
///     "527",
/// ));
/// let connection = MqttConnector::default().connect(&config).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MqttConnector {
    keep_alive: Duration,
    frame_queue_capacity: usize,
}

impl Default for MqttConnector {
    fn default() -> Self {
        Self {
            keep_alive: Duration::from_secs(30),
            frame_queue_capacity: 64,
        }
    }
}

impl MqttConnector {
    /// Creates a connector with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the MQTT keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets the capacity of the incoming frame queue (default: 64).
    #[must_use]
    pub fn frame_queue_capacity(mut self, capacity: usize) -> Self {
        self.frame_queue_capacity = capacity.max(1);
        self
    }
}

impl Connector for MqttConnector {
    type Transport = MqttSession;

    async fn connect(
        &self,
        config: &TransportConfig,
    ) -> Result<Connection<MqttSession>, TransportError> {
        let options = match config {
            TransportConfig::Local(local) => local::mqtt_options(local, self.keep_alive)?,
            TransportConfig::Cloud(cloud) => cloud::mqtt_options(cloud, self.keep_alive)?,
        };
        session::open(options, config.mode(), self.frame_queue_capacity).await
    }
}
