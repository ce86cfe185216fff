// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State change representation.
//!
//! State changes are the building blocks for updating a
//! [`StateStore`](super::StateStore). They are produced by decoding device
//! messages:
//!
//! | Message | Change | Semantics |
//! |---------|--------|-----------|
//! | `CURRENT-STATE` | [`StateChange::Snapshot`] | full replace of the control state |
//! | `STATE-CHANGE` | [`StateChange::Delta`] | merge of the touched keys |
//! | `ENVIRONMENTAL-CURRENT-SENSOR-DATA` | [`StateChange::Environment`] | merge into the sensor map |

use super::StateMap;

/// A change to apply to a device's state.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StateChange {
    /// Authoritative control state. Keys it omits are removed.
    Snapshot(StateMap),

    /// Partial control state update naming only the changed keys.
    Delta(StateMap),

    /// Partial environmental sensor update.
    Environment(StateMap),
}

impl StateChange {
    /// Returns the key/value pairs carried by the change.
    #[must_use]
    pub fn values(&self) -> &StateMap {
        match self {
            Self::Snapshot(values) | Self::Delta(values) | Self::Environment(values) => values,
        }
    }

    /// Returns `true` if this change targets the environmental map.
    #[must_use]
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::Environment(_))
    }

    /// Returns `true` if this change replaces the control state wholesale.
    #[must_use]
    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::Snapshot(_))
    }
}
