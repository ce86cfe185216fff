// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic state requests.
//!
//! Devices push only some changes on their own, so the engine asks for the
//! full state, the sensor data and the fault dump on separate cadences.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior, interval_at};

use crate::command::PollRequest;
use crate::connection::{PollSettings, deadline_after};

/// Poll timers of one device.
///
/// The scheduler starts suspended. [`resume`](Self::resume) arms the timers
/// and returns the requests to send right away, so state is fresh as soon as
/// a link comes up. While suspended, [`tick`](Self::tick) never completes.
#[derive(Debug)]
pub struct PollingScheduler {
    settings: PollSettings,
    timers: Option<Timers>,
}

#[derive(Debug)]
struct Timers {
    state: Interval,
    environment: Interval,
    faults: Interval,
}

fn timer(period: Duration) -> Interval {
    let mut interval = interval_at(deadline_after(period), period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl PollingScheduler {
    /// Creates a suspended scheduler.
    #[must_use]
    pub fn new(settings: PollSettings) -> Self {
        Self {
            settings,
            timers: None,
        }
    }

    /// Returns `true` while the timers are armed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.timers.is_some()
    }

    /// (Re)arms all timers from now and returns the immediate requests.
    pub fn resume(&mut self) -> [PollRequest; 3] {
        self.timers = Some(Timers {
            state: timer(self.settings.state_interval),
            environment: timer(self.settings.environment_interval),
            faults: timer(self.settings.fault_interval),
        });
        PollRequest::ALL
    }

    /// Disarms all timers.
    pub fn suspend(&mut self) {
        self.timers = None;
    }

    /// Waits for the next due request.
    ///
    /// Cancel safe.
    pub async fn tick(&mut self) -> PollRequest {
        let Some(timers) = self.timers.as_mut() else {
            return std::future::pending().await;
        };
        tokio::select! {
            biased;
            _ = timers.state.tick() => PollRequest::CurrentState,
            _ = timers.environment.tick() => PollRequest::EnvironmentalData,
            _ = timers.faults.tick() => PollRequest::CurrentFaults,
        }
    }
}
