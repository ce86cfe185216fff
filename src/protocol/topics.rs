// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT topic layout.

use crate::types::DeviceSerial;

const ROOT_PLACEHOLDER: &str = "{root}";
const SERIAL_PLACEHOLDER: &str = "{serial}";

/// Topic templates shared by every call site.
///
/// Templates use the `{root}` and `{serial}` placeholders. The defaults are:
///
/// | Purpose | Template |
/// |---------|----------|
/// | publish commands | `{root}/{serial}/command` |
/// | state and sensor data | `{root}/{serial}/status/current` |
/// | fault dumps | `{root}/{serial}/status/faults` |
///
/// # Examples
///
/// ```
/// use applink_lib::protocol::TopicTemplate;
/// use applink_lib::types::DeviceSerial;
///
/// let topics = TopicTemplate::default().render("438", &DeviceSerial::new("AB1-EU-CDE"));
/// assert_eq!(topics.command, "438/AB1-EU-CDE/command");
/// assert_eq!(topics.status_faults, "438/AB1-EU-CDE/status/faults");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTemplate {
    command: String,
    status_current: String,
    status_faults: String,
}

impl Default for TopicTemplate {
    fn default() -> Self {
        Self {
            command: "{root}/{serial}/command".to_string(),
            status_current: "{root}/{serial}/status/current".to_string(),
            status_faults: "{root}/{serial}/status/faults".to_string(),
        }
    }
}

impl TopicTemplate {
    /// Creates a template set from explicit templates.
    #[must_use]
    pub fn new(
        command: impl Into<String>,
        status_current: impl Into<String>,
        status_faults: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            status_current: status_current.into(),
            status_faults: status_faults.into(),
        }
    }

    /// Renders the templates for one device.
    #[must_use]
    pub fn render(&self, root: &str, serial: &DeviceSerial) -> TopicSet {
        let fill = |template: &str| {
            template
                .replace(ROOT_PLACEHOLDER, root)
                .replace(SERIAL_PLACEHOLDER, serial.as_str())
        };
        TopicSet {
            command: fill(&self.command),
            status_current: fill(&self.status_current),
            status_faults: fill(&self.status_faults),
        }
    }
}

/// Concrete topics for one device on one transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    /// Topic commands and requests are published to.
    pub command: String,
    /// Topic carrying state and sensor messages.
    pub status_current: String,
    /// Topic carrying fault dumps.
    pub status_faults: String,
}

impl TopicSet {
    /// Returns the topics to subscribe to.
    #[must_use]
    pub fn subscriptions(&self) -> [&str; 2] {
        [&self.status_current, &self.status_faults]
    }
}
