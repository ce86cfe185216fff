// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded incoming messages.

use crate::state::{FaultSnapshot, StateChange, StateMap};

/// A device message after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedMessage {
    /// `CURRENT-STATE`: the full control state.
    CurrentState(StateMap),

    /// `STATE-CHANGE`: the new value of each touched key.
    StateChange(StateMap),

    /// `ENVIRONMENTAL-CURRENT-SENSOR-DATA`: sensor readings.
    EnvironmentalData(StateMap),

    /// `CURRENT-FAULTS`: the complete fault dump.
    CurrentFaults(FaultSnapshot),

    /// A well-formed message of a type this library does not interpret.
    Other {
        /// The `msg` value.
        kind: String,
        /// The whole message.
        body: serde_json::Value,
    },
}

impl DecodedMessage {
    /// Returns the `msg` value of the message.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::CurrentState(_) => "CURRENT-STATE",
            Self::StateChange(_) => "STATE-CHANGE",
            Self::EnvironmentalData(_) => "ENVIRONMENTAL-CURRENT-SENSOR-DATA",
            Self::CurrentFaults(_) => "CURRENT-FAULTS",
            Self::Other { kind, .. } => kind,
        }
    }

    /// Converts a state-bearing message into the change to apply.
    ///
    /// Returns `None` for fault dumps and unrecognised messages.
    #[must_use]
    pub fn into_state_change(self) -> Option<StateChange> {
        match self {
            Self::CurrentState(state) => Some(StateChange::Snapshot(state)),
            Self::StateChange(changes) => Some(StateChange::Delta(changes)),
            Self::EnvironmentalData(data) => Some(StateChange::Environment(data)),
            Self::CurrentFaults(_) | Self::Other { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_change_mapping() {
        let msg = DecodedMessage::CurrentState(StateMap::new());
        assert_eq!(msg.kind(), "CURRENT-STATE");
        assert!(msg.into_state_change().unwrap().is_snapshot());

        let other = DecodedMessage::Other {
            kind: "LOCK-STATE".to_string(),
            body: serde_json::Value::Null,
        };
        assert_eq!(other.kind(), "LOCK-STATE");
        assert!(other.into_state_change().is_none());
    }
}
