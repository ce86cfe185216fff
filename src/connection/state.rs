// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Observable connection state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ConnectionMode, ConnectionStatus};

/// Phase of the connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", content = "mode", rename_all = "snake_case")]
pub enum LinkState {
    /// No live transport and no attempt running.
    #[default]
    Disconnected,
    /// An attempt against the given mode is running.
    Connecting(ConnectionMode),
    /// A transport of the given mode is live.
    Connected(ConnectionMode),
}

/// Connection state of one device, owned by its engine.
///
/// While connected, `fallback_active` is `true` exactly when the live mode
/// differs from the preferred mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    /// State machine phase.
    pub phase: LinkState,
    /// Mode of the live transport.
    pub current: ConnectionStatus,
    /// Connected through the non-preferred mode.
    pub fallback_active: bool,
    /// First mode of the policy.
    pub preferred_mode: ConnectionMode,
    /// Start of the latest return-to-preferred probe.
    pub last_preferred_retry_at: Option<DateTime<Utc>>,
    /// Failed attempt cycles since the last successful connect.
    pub consecutive_failures: u32,
}

impl ConnectionState {
    /// Creates the disconnected state for a preferred mode.
    #[must_use]
    pub fn new(preferred_mode: ConnectionMode) -> Self {
        Self {
            phase: LinkState::Disconnected,
            current: ConnectionStatus::Disconnected,
            fallback_active: false,
            preferred_mode,
            last_preferred_retry_at: None,
            consecutive_failures: 0,
        }
    }

    /// Returns `true` while a transport is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.current.is_connected()
    }

    pub(crate) fn set_connecting(&mut self, mode: ConnectionMode) {
        // A running probe does not disturb the live link.
        if !self.is_connected() {
            self.phase = LinkState::Connecting(mode);
        }
    }

    pub(crate) fn set_connected(&mut self, mode: ConnectionMode) {
        self.phase = LinkState::Connected(mode);
        self.current = ConnectionStatus::from(mode);
        self.fallback_active = mode != self.preferred_mode;
        self.consecutive_failures = 0;
    }

    pub(crate) fn set_disconnected(&mut self) {
        self.phase = LinkState::Disconnected;
        self.current = ConnectionStatus::Disconnected;
    }

    pub(crate) fn record_failure(&mut self) {
        self.set_disconnected();
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_follows_connected_mode() {
        let mut state = ConnectionState::new(ConnectionMode::Cloud);
        state.set_connecting(ConnectionMode::Cloud);
        assert_eq!(state.phase, LinkState::Connecting(ConnectionMode::Cloud));

        state.record_failure();
        state.set_connected(ConnectionMode::Local);
        assert!(state.fallback_active);
        assert_eq!(state.current, ConnectionStatus::Local);
        assert_eq!(state.consecutive_failures, 0);

        state.set_connected(ConnectionMode::Cloud);
        assert!(!state.fallback_active);
    }

    #[test]
    fn probe_does_not_change_phase_while_connected() {
        let mut state = ConnectionState::new(ConnectionMode::Local);
        state.set_connected(ConnectionMode::Cloud);
        state.set_connecting(ConnectionMode::Local);
        assert_eq!(state.phase, LinkState::Connected(ConnectionMode::Cloud));
    }

    #[test]
    fn failures_accumulate() {
        let mut state = ConnectionState::new(ConnectionMode::Local);
        state.record_failure();
        state.record_failure();
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.current, ConnectionStatus::Disconnected);
        assert!(!state.is_connected());
    }
}
