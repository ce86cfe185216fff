// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level device abstraction.
//!
//! A [`Device`] ties together the connection engine, the state store and
//! event delivery for one appliance. Create one with [`Device::builder`],
//! then call [`Device::connect`] with a policy and the credentials supplied
//! by your account or discovery layer.
//!
//! ```no_run
//! use applink_lib::Device;
//! use applink_lib::command::CommandRequest;
//! use applink_lib::subscription::Subscribable;
//! use applink_lib::transport::{DeviceCredentials, LocalCredentials};
//! use applink_lib::types::ConnectionPolicy;
//!
//! # async fn example() -> applink_lib::Result<()> {
//! let device = Device::builder("XX9-EU-ABC1234A")
//!     .static_host("192.168.1.40")
//!     .build();
//!
//! device.on_state_changed(|state, changed| {
//!     println!("{changed:?} changed, power is {:?}", state.get("fpwr"));
//! });
//!
//! let credentials = DeviceCredentials::local(LocalCredentials::new("device-credential", "527"));
//! device.connect(ConnectionPolicy::LocalOnly, credentials).await?;
//!
//! device
//!     .send_command(&CommandRequest::new().set_switch("fpwr", true))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::DeviceBuilder;
pub(crate) use builder::mqtt_connector;

use std::sync::Arc;

use tokio::sync::{Mutex, oneshot, watch};

use crate::command::CommandRequest;
use crate::connection::ConnectionState;
use crate::connection::engine::{self, Control, DeviceContext, EngineHandle};
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, DeviceReceiver, EventBus};
use crate::state::{FaultDiff, FaultSnapshot, StateMap};
use crate::subscription::{Subscribable, SubscriptionId};
use crate::transport::{Connector, DeviceCredentials, MqttConnector};
use crate::types::{ConnectionPolicy, ConnectionStatus, DeviceSerial};

/// A connected appliance.
///
/// The type parameter selects how transports are established. The default,
/// [`MqttConnector`], talks to real brokers; tests and alternative stacks
/// can supply their own [`Connector`] through
/// [`DeviceBuilder::build_with_connector`].
///
/// All methods take `&self`; a device is usually shared as `Arc<Device>`.
/// Dropping the device stops its engine and closes the live transport.
pub struct Device<C: Connector = MqttConnector> {
    ctx: Arc<DeviceContext<C::Transport>>,
    connector: Arc<C>,
    engine: Mutex<Option<EngineHandle>>,
}

impl<C: Connector> std::fmt::Debug for Device<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("serial", &self.ctx.serial)
            .field("status", &self.ctx.connection_status())
            .finish_non_exhaustive()
    }
}

impl Device<MqttConnector> {
    /// Creates a builder for the device with the given serial.
    ///
    /// # Examples
    ///
    /// ```
    /// use applink_lib::Device;
    ///
    /// let device = Device::builder("XX9-EU-ABC1234A").build();
    /// assert_eq!(device.serial().as_str(), "XX9-EU-ABC1234A");
    /// ```
    #[must_use]
    pub fn builder(serial: impl Into<DeviceSerial>) -> DeviceBuilder {
        DeviceBuilder::new(serial)
    }
}

impl<C: Connector> Device<C> {
    pub(crate) fn new(ctx: DeviceContext<C::Transport>, connector: C) -> Self {
        Self {
            ctx: Arc::new(ctx),
            connector: Arc::new(connector),
            engine: Mutex::new(None),
        }
    }

    /// Returns the device serial.
    #[must_use]
    pub fn serial(&self) -> &DeviceSerial {
        &self.ctx.serial
    }

    // ========== Connection lifecycle ==========

    /// Starts the connection engine and waits for its first attempt cycle.
    ///
    /// The modes of `policy` are tried in order, skipping modes without
    /// credentials. Once connected the engine keeps the device connected in
    /// the background until [`disconnect`](Self::disconnect) is called.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfiguration`] if the settings are inconsistent or
    ///   the preferred mode has no credentials
    /// - [`Error::AlreadyConnected`] if the engine is already running
    /// - [`Error::Transport`] if every mode failed; the engine keeps retrying
    /// - [`Error::UnsupportedDevice`] if the device can never be driven; the
    ///   engine has stopped
    pub async fn connect(
        &self,
        policy: ConnectionPolicy,
        credentials: DeviceCredentials,
    ) -> Result<ConnectionStatus> {
        self.ctx.settings.validate()?;
        let preferred = policy.preferred();
        if !credentials.supports(preferred) {
            return Err(Error::InvalidConfiguration(format!(
                "no {preferred} credentials for preferred mode"
            )));
        }

        let first = {
            let mut slot = self.engine.lock().await;
            if slot.as_ref().is_some_and(EngineHandle::is_running) {
                return Err(Error::AlreadyConnected);
            }
            if let Some(stopped) = slot.take() {
                stopped.shutdown().await;
            }

            tracing::info!(serial = %self.ctx.serial, ?policy, "Connecting device");
            let (tx, rx) = oneshot::channel();
            *slot = Some(engine::spawn(
                Arc::clone(&self.ctx),
                Arc::clone(&self.connector),
                policy,
                credentials,
                tx,
            ));
            rx
        };

        first.await.map_err(|_| Error::NotConnected)?
    }

    /// Stops the engine, cancels its timers and closes the live transport.
    ///
    /// Does nothing if the device is not connected.
    pub async fn disconnect(&self) {
        let handle = self.engine.lock().await.take();
        if let Some(handle) = handle {
            handle.shutdown().await;
            tracing::info!(serial = %self.ctx.serial, "Device disconnected");
        }
    }

    /// Asks the engine to try the preferred transport now instead of waiting
    /// for the next periodic probe.
    ///
    /// While disconnected this skips the remaining reconnect backoff.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the engine is not running.
    pub async fn reconnect_preferred(&self) -> Result<()> {
        let slot = self.engine.lock().await;
        match slot.as_ref() {
            Some(handle) if handle.is_running() => {
                if !handle.request(Control::ReconnectPreferred) {
                    tracing::debug!(serial = %self.ctx.serial, "Reconnect request already queued");
                }
                Ok(())
            }
            _ => Err(Error::NotConnected),
        }
    }

    /// Replaces the static local host. Takes effect on the next local attempt.
    ///
    /// `None` goes back to discovery and the `{serial}.local` fallback.
    pub fn set_static_host(&self, host: Option<String>) {
        *self.ctx.static_host.write() = host;
    }

    // ========== Commands ==========

    /// Publishes a `STATE-SET` command on the live transport.
    ///
    /// Commands are never retried automatically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Command`] if the command is empty, the device is not
    /// connected or the publish fails or times out.
    pub async fn send_command(&self, command: &CommandRequest) -> Result<()> {
        self.ctx.send_command(command).await.map_err(Error::from)
    }

    // ========== State ==========

    /// Returns a copy of the control state.
    #[must_use]
    pub fn state(&self) -> StateMap {
        self.ctx.store.snapshot()
    }

    /// Returns a copy of the environmental readings.
    #[must_use]
    pub fn environmental_state(&self) -> StateMap {
        self.ctx.store.environment()
    }

    /// Returns a copy of the latest fault dump.
    #[must_use]
    pub fn faults(&self) -> FaultSnapshot {
        self.ctx.store.faults()
    }

    /// Returns the transport currently in use.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.ctx.connection_status()
    }

    /// Returns the full connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.ctx.state.borrow().clone()
    }

    // ========== Events ==========

    /// Returns a receiver of this device's events.
    #[must_use]
    pub fn subscribe(&self) -> DeviceReceiver {
        self.ctx.events.subscribe_device(self.ctx.serial.clone())
    }

    /// Returns a receiver that observes every connection state change.
    #[must_use]
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state.subscribe()
    }

    /// Returns the bus this device publishes on.
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.ctx.events
    }
}

impl<C: Connector> Subscribable for Device<C> {
    fn on_state_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateMap, &[String]) + Send + Sync + 'static,
    {
        self.ctx.callbacks.on_state_changed(callback)
    }

    fn on_environment_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StateMap) + Send + Sync + 'static,
    {
        self.ctx.callbacks.on_environment_changed(callback)
    }

    fn on_faults_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FaultDiff) + Send + Sync + 'static,
    {
        self.ctx.callbacks.on_faults_changed(callback)
    }

    fn on_connection_changed<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ConnectionStatus, bool) + Send + Sync + 'static,
    {
        self.ctx.callbacks.on_connection_changed(callback)
    }

    fn on_event<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.ctx.callbacks.on_event(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.ctx.callbacks.unsubscribe(id)
    }
}
