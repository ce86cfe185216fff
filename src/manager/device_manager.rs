// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device manager for coordinating multiple appliances.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

use crate::command::CommandRequest;
use crate::connection::EngineSettings;
use crate::device::{Device, DeviceBuilder, mqtt_connector};
use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventBus};
use crate::transport::{Connector, DeviceCredentials, HostResolver, MqttConnector};
use crate::types::{ConnectionPolicy, ConnectionStatus, DeviceSerial};

use super::device_config::DeviceConfig;
use super::managed_device::ManagedDevice;

/// Registry of devices keyed by serial.
///
/// Each device runs its own independent connection engine; the manager only
/// owns them and shares one [`EventBus`] between them.
///
/// # Examples
///
/// ```no_run
/// use applink_lib::manager::{DeviceConfig, DeviceManager};
/// use applink_lib::transport::{DeviceCredentials, LocalCredentials};
///
/// #[tokio::main]
/// async fn main() -> applink_lib::Result<()> {
///     let manager = DeviceManager::new();
///
///     let mut events = manager.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {event:?}");
///         }
///     });
///
///     let credentials = DeviceCredentials::local(LocalCredentials::new("device-credential", "527"));
///     let config = DeviceConfig::new("XX9-EU-ABC1234A", credentials);
///     let serial = config.serial.clone();
///     manager.add_device(config).await?;
///     manager.connect(&serial).await?;
///
///     manager.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct DeviceManager<C: Connector + Clone = MqttConnector> {
    /// Managed devices, keyed by serial.
    devices: Arc<RwLock<HashMap<DeviceSerial, ManagedDevice<C>>>>,
    /// Event bus shared by every managed device.
    event_bus: EventBus,
    /// Settings applied to devices built from a [`DeviceConfig`].
    settings: EngineSettings,
    /// Discovery lookup shared by every managed device.
    resolver: Option<Arc<dyn HostResolver>>,
    connector: C,
}

impl<C: Connector + Clone> std::fmt::Debug for DeviceManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("settings", &self.settings)
            .field("subscribers", &self.event_bus.subscriber_count())
            .finish_non_exhaustive()
    }
}

impl DeviceManager<MqttConnector> {
    /// Creates a manager with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    /// Creates a manager whose devices use `settings`.
    #[must_use]
    pub fn with_settings(settings: EngineSettings) -> Self {
        let connector = mqtt_connector(&settings);
        Self::with_connector(connector, settings)
    }
}

impl Default for DeviceManager<MqttConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector + Clone> DeviceManager<C> {
    /// Creates a manager whose devices connect through `connector`.
    #[must_use]
    pub fn with_connector(connector: C, settings: EngineSettings) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            event_bus: EventBus::new(),
            settings,
            resolver: None,
            connector,
        }
    }

    /// Sets the event bus capacity.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_bus = EventBus::with_capacity(capacity);
        self
    }

    /// Sets the discovery lookup used by devices added afterwards.
    #[must_use]
    pub fn with_resolver(mut self, resolver: impl HostResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    // =========================================================================
    // Subscription
    // =========================================================================

    /// Subscribes to the events of every managed device.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_bus.subscribe()
    }

    /// Returns the number of active event subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.event_bus.subscriber_count()
    }

    // =========================================================================
    // Device Management
    // =========================================================================

    /// Returns a builder preset with the manager's bus, settings and resolver.
    ///
    /// Devices built from it and registered with [`insert`](Self::insert)
    /// publish on the manager's bus.
    #[must_use]
    pub fn device_builder(&self, serial: impl Into<DeviceSerial>) -> DeviceBuilder {
        let builder = Device::builder(serial)
            .settings(self.settings.clone())
            .event_bus(self.event_bus.clone());
        match &self.resolver {
            Some(resolver) => builder.shared_resolver(Arc::clone(resolver)),
            None => builder,
        }
    }

    /// Builds and registers a device from its persisted configuration.
    ///
    /// The device is not connected automatically. Call
    /// [`connect`](Self::connect) to start it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the serial is empty or
    /// already registered.
    pub async fn add_device(&self, config: DeviceConfig) -> Result<Arc<Device<C>>> {
        let mut builder = self
            .device_builder(config.serial.clone())
            .settings(config.settings(&self.settings));
        if let Some(host) = config.static_host() {
            builder = builder.static_host(host);
        }
        let device = builder.build_with_connector(self.connector.clone());
        self.insert(device, config.policy, config.credentials).await
    }

    /// Registers an already built device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the serial is empty or
    /// already registered.
    pub async fn insert(
        &self,
        device: Device<C>,
        policy: ConnectionPolicy,
        credentials: DeviceCredentials,
    ) -> Result<Arc<Device<C>>> {
        let serial = device.serial().clone();
        if serial.is_empty() {
            return Err(Error::InvalidConfiguration("empty device serial".to_string()));
        }

        let managed = ManagedDevice::new(device, policy, credentials);
        let device = Arc::clone(&managed.device);
        {
            let mut devices = self.devices.write().await;
            if devices.contains_key(&serial) {
                return Err(Error::InvalidConfiguration(format!(
                    "device {serial} is already registered"
                )));
            }
            devices.insert(serial.clone(), managed);
        }

        let reached = self.event_bus.publish_counted(DeviceEvent::DeviceAdded {
            serial: serial.clone(),
        });
        tracing::debug!(serial = %serial, ?policy, subscribers = reached, "Device added");
        Ok(device)
    }

    /// Removes a device, disconnecting it first.
    ///
    /// Returns `true` if the device was registered.
    pub async fn remove(&self, serial: &DeviceSerial) -> bool {
        let removed = self.devices.write().await.remove(serial);
        let Some(managed) = removed else {
            return false;
        };

        managed.device.disconnect().await;
        let reached = self.event_bus.publish_counted(DeviceEvent::DeviceRemoved {
            serial: serial.clone(),
        });
        tracing::debug!(serial = %serial, subscribers = reached, "Device removed");
        true
    }

    /// Returns a registered device.
    pub async fn device(&self, serial: &DeviceSerial) -> Option<Arc<Device<C>>> {
        self.devices
            .read()
            .await
            .get(serial)
            .map(|managed| Arc::clone(&managed.device))
    }

    /// Returns the serials of every registered device, sorted.
    pub async fn serials(&self) -> Vec<DeviceSerial> {
        let mut serials: Vec<DeviceSerial> = self.devices.read().await.keys().cloned().collect();
        serials.sort();
        serials
    }

    /// Returns the number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Returns `true` if no device is registered.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    async fn managed(&self, serial: &DeviceSerial) -> Result<ManagedDevice<C>> {
        self.devices
            .read()
            .await
            .get(serial)
            .cloned()
            .ok_or_else(|| Error::DeviceNotFound(serial.to_string()))
    }

    /// Connects a device with its registered policy and credentials.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown serial, otherwise
    /// whatever [`Device::connect`] returns.
    pub async fn connect(&self, serial: &DeviceSerial) -> Result<ConnectionStatus> {
        self.managed(serial).await?.connect().await
    }

    /// Disconnects a device without removing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown serial.
    pub async fn disconnect(&self, serial: &DeviceSerial) -> Result<()> {
        self.managed(serial).await?.device.disconnect().await;
        Ok(())
    }

    /// Asks a device to try its preferred transport now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown serial and
    /// [`Error::NotConnected`] if its engine is not running.
    pub async fn reconnect_preferred(&self, serial: &DeviceSerial) -> Result<()> {
        self.managed(serial).await?.device.reconnect_preferred().await
    }

    /// Sends a command to a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] for an unknown serial, otherwise
    /// whatever [`Device::send_command`] returns.
    pub async fn send_command(&self, serial: &DeviceSerial, command: &CommandRequest) -> Result<()> {
        self.managed(serial).await?.device.send_command(command).await
    }

    /// Returns the connection status of every registered device.
    pub async fn connection_statuses(&self) -> Vec<(DeviceSerial, ConnectionStatus)> {
        let mut statuses: Vec<_> = self
            .devices
            .read()
            .await
            .iter()
            .map(|(serial, managed)| (serial.clone(), managed.device.connection_status()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Disconnects every device. Devices stay registered.
    pub async fn shutdown(&self) {
        let devices: Vec<Arc<Device<C>>> = self
            .devices
            .read()
            .await
            .values()
            .map(|managed| Arc::clone(&managed.device))
            .collect();

        for device in devices {
            device.disconnect().await;
        }
        tracing::info!("Device manager shut down");
    }
}
