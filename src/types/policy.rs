// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! User policy selecting the preferred transport.

use serde::{Deserialize, Serialize};

use super::ConnectionMode;

/// Which transports may be used, and in which order.
///
/// The first entry of [`attempt_order`](Self::attempt_order) is the
/// preferred mode. The engine always tries to return to it.
///
/// # Examples
///
/// ```
/// use applink_lib::types::{ConnectionMode, ConnectionPolicy};
///
/// let policy = ConnectionPolicy::CloudWithLocalFallback;
/// assert_eq!(policy.preferred(), ConnectionMode::Cloud);
/// assert_eq!(
///     policy.attempt_order(),
///     &[ConnectionMode::Cloud, ConnectionMode::Local]
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPolicy {
    /// Only the local broker.
    LocalOnly,
    /// Local broker first, cloud when local fails.
    #[default]
    LocalWithCloudFallback,
    /// Cloud first, local broker when cloud fails.
    CloudWithLocalFallback,
    /// Only the cloud proxy.
    CloudOnly,
}

impl ConnectionPolicy {
    /// Returns the modes to try, preferred first.
    #[must_use]
    pub const fn attempt_order(self) -> &'static [ConnectionMode] {
        match self {
            Self::LocalOnly => &[ConnectionMode::Local],
            Self::LocalWithCloudFallback => &[ConnectionMode::Local, ConnectionMode::Cloud],
            Self::CloudWithLocalFallback => &[ConnectionMode::Cloud, ConnectionMode::Local],
            Self::CloudOnly => &[ConnectionMode::Cloud],
        }
    }

    /// Returns the preferred mode.
    #[must_use]
    pub const fn preferred(self) -> ConnectionMode {
        match self {
            Self::LocalOnly | Self::LocalWithCloudFallback => ConnectionMode::Local,
            Self::CloudWithLocalFallback | Self::CloudOnly => ConnectionMode::Cloud,
        }
    }

    /// Returns the fallback mode, if the policy permits one.
    #[must_use]
    pub const fn fallback(self) -> Option<ConnectionMode> {
        match self {
            Self::LocalWithCloudFallback => Some(ConnectionMode::Cloud),
            Self::CloudWithLocalFallback => Some(ConnectionMode::Local),
            Self::LocalOnly | Self::CloudOnly => None,
        }
    }

    /// Returns `true` if the policy ever uses `mode`.
    #[must_use]
    pub fn allows(self, mode: ConnectionMode) -> bool {
        self.attempt_order().contains(&mode)
    }
}
