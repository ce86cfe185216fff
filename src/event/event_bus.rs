// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast bus for device events.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::DeviceEvent;
use crate::types::DeviceSerial;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Broadcasts [`DeviceEvent`]s to any number of subscribers.
///
/// Cloning the bus yields another handle on the same channel. A slow
/// subscriber that falls more than the capacity (default 256) behind loses
/// the oldest events and gets [`RecvError::Lagged`] once.
///
/// # Examples
///
/// ```
/// use applink_lib::event::{DeviceEvent, EventBus};
/// use applink_lib::types::DeviceSerial;
///
/// let bus = EventBus::new();
///
/// // Create a subscriber
/// let mut rx = bus.subscribe();
///
/// // Publish an event
/// bus.publish(DeviceEvent::DeviceAdded {
///     serial: DeviceSerial::new("XX9-EU-ABC1234A"),
/// });
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DeviceEvent>,
}

impl EventBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus buffering at most `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.sender.subscribe()
    }

    /// Subscribes to the events of a single device.
    #[must_use]
    pub fn subscribe_device(&self, serial: DeviceSerial) -> DeviceReceiver {
        DeviceReceiver {
            inner: self.sender.subscribe(),
            serial,
        }
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event. Without subscribers the event is discarded.
    pub fn publish(&self, event: DeviceEvent) {
        let _ = self.sender.send(event);
    }

    /// Publishes an event and returns how many subscribers it reached.
    #[must_use]
    pub fn publish_counted(&self, event: DeviceEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver yielding only the events of one device.
#[derive(Debug)]
pub struct DeviceReceiver {
    inner: broadcast::Receiver<DeviceEvent>,
    serial: DeviceSerial,
}

impl DeviceReceiver {
    /// Waits for the next event of the device.
    ///
    /// # Errors
    ///
    /// Returns [`RecvError::Closed`] once every bus handle is dropped, and
    /// [`RecvError::Lagged`] if events were lost.
    pub async fn recv(&mut self) -> Result<DeviceEvent, RecvError> {
        loop {
            let event = self.inner.recv().await?;
            if event.serial() == &self.serial {
                return Ok(event);
            }
        }
    }

    /// Returns the serial this receiver follows.
    #[must_use]
    pub fn serial(&self) -> &DeviceSerial {
        &self.serial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConnectionStatus, DeviceSerial};

    fn connected(serial: &str) -> DeviceEvent {
        DeviceEvent::ConnectionChanged {
            serial: DeviceSerial::new(serial),
            status: ConnectionStatus::Local,
            fallback_active: false,
        }
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);

        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn publish_delivers_to_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(connected("S1"));

        assert_eq!(rx1.recv().await.unwrap().serial().as_str(), "S1");
        assert_eq!(rx2.recv().await.unwrap().serial().as_str(), "S1");
    }

    #[test]
    fn publish_counted_returns_receiver_count() {
        let bus = EventBus::new();
        assert_eq!(bus.publish_counted(connected("S1")), 0);

        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.publish_counted(connected("S1")), 2);
    }

    #[tokio::test]
    async fn device_receiver_filters_other_devices() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_device(DeviceSerial::new("S2"));

        bus.publish(connected("S1"));
        bus.publish(connected("S2"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.serial().as_str(), "S2");
        assert_eq!(rx.serial().as_str(), "S2");
    }

    #[test]
    fn clone_shares_same_channel() {
        let bus1 = EventBus::with_capacity(16);
        let bus2 = bus1.clone();

        let _rx = bus1.subscribe();
        assert_eq!(bus2.subscriber_count(), 1);
    }
}
