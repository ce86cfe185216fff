// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Requests asking the device to report its state.

use super::Command;

/// A request for the device to publish part of its state.
///
/// Devices do not push most changes on their own, so these are sent
/// periodically by the [`PollingScheduler`](crate::polling::PollingScheduler)
/// and once on every (re)connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollRequest {
    /// `REQUEST-CURRENT-STATE`, answered with `CURRENT-STATE`.
    CurrentState,
    /// `REQUEST-PRODUCT-ENVIRONMENT-CURRENT-SENSOR-DATA`, answered with
    /// `ENVIRONMENTAL-CURRENT-SENSOR-DATA`.
    EnvironmentalData,
    /// `REQUEST-CURRENT-FAULTS`, answered with `CURRENT-FAULTS`.
    CurrentFaults,
}

impl PollRequest {
    /// All requests, in the order they are sent after a (re)connect.
    pub const ALL: [Self; 3] = [
        Self::CurrentState,
        Self::EnvironmentalData,
        Self::CurrentFaults,
    ];
}

impl Command for PollRequest {
    fn msg(&self) -> &'static str {
        match self {
            Self::CurrentState => "REQUEST-CURRENT-STATE",
            Self::EnvironmentalData => "REQUEST-PRODUCT-ENVIRONMENT-CURRENT-SENSOR-DATA",
            Self::CurrentFaults => "REQUEST-CURRENT-FAULTS",
        }
    }
}
