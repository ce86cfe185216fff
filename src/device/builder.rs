// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device builder.

use std::sync::Arc;

use crate::connection::EngineSettings;
use crate::connection::engine::DeviceContext;
use crate::device::Device;
use crate::event::EventBus;
use crate::protocol::TopicTemplate;
use crate::transport::{Connector, HostResolver, MqttConnector};
use crate::types::DeviceSerial;

/// Builder for [`Device`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use applink_lib::Device;
/// use applink_lib::connection::EngineSettings;
/// use applink_lib::types::DeviceSerial;
///
/// let device = Device::builder("XX9-EU-ABC1234A")
///     .settings(EngineSettings::default().with_state_poll_interval(Duration::from_secs(5)))
///     .resolver(|serial: &DeviceSerial| Some(format!("{}.lan", serial.as_str())))
///     .build();
/// ```
pub struct DeviceBuilder {
    serial: DeviceSerial,
    settings: EngineSettings,
    topics: TopicTemplate,
    resolver: Option<Arc<dyn HostResolver>>,
    static_host: Option<String>,
    event_bus: Option<EventBus>,
}

impl std::fmt::Debug for DeviceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuilder")
            .field("serial", &self.serial)
            .field("settings", &self.settings)
            .field("topics", &self.topics)
            .field("resolver", &self.resolver.is_some())
            .field("static_host", &self.static_host)
            .finish_non_exhaustive()
    }
}

impl DeviceBuilder {
    pub(crate) fn new(serial: impl Into<DeviceSerial>) -> Self {
        Self {
            serial: serial.into(),
            settings: EngineSettings::default(),
            topics: TopicTemplate::default(),
            resolver: None,
            static_host: None,
            event_bus: None,
        }
    }

    /// Sets timeouts, backoff and polling cadences.
    #[must_use]
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Overrides the MQTT topic templates.
    #[must_use]
    pub fn topics(mut self, topics: TopicTemplate) -> Self {
        self.topics = topics;
        self
    }

    /// Sets the discovery lookup consulted when no static host is set.
    #[must_use]
    pub fn resolver(mut self, resolver: impl HostResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Sets a static host name or IP for the local broker, skipping discovery.
    ///
    /// Blank values are ignored at connect time.
    #[must_use]
    pub fn static_host(mut self, host: impl Into<String>) -> Self {
        self.static_host = Some(host.into());
        self
    }

    /// Sets a discovery lookup shared with other devices.
    #[must_use]
    pub fn shared_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Publishes events on a shared bus instead of a private one.
    #[must_use]
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Builds a device using real MQTT transports.
    #[must_use]
    pub fn build(self) -> Device<MqttConnector> {
        let connector = mqtt_connector(&self.settings);
        self.build_with_connector(connector)
    }

    /// Builds a device establishing transports through `connector`.
    #[must_use]
    pub fn build_with_connector<C: Connector>(self, connector: C) -> Device<C> {
        let ctx = DeviceContext::new(
            self.serial,
            self.settings,
            self.topics,
            self.event_bus.unwrap_or_default(),
            self.resolver,
            self.static_host,
        );
        Device::new(ctx, connector)
    }
}

/// The MQTT connector matching the transport-level settings.
pub(crate) fn mqtt_connector(settings: &EngineSettings) -> MqttConnector {
    MqttConnector::new()
        .keep_alive(settings.keep_alive)
        .frame_queue_capacity(settings.frame_queue_capacity)
}
