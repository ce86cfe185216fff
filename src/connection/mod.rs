// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection resilience.
//!
//! Each connected [`Device`](crate::Device) runs one engine task. The engine
//! walks the [`ConnectionPolicy`](crate::types::ConnectionPolicy) order,
//! retries the local broker on a short backoff before falling back, keeps
//! reconnecting in the background after a failed cycle and, while on the
//! fallback transport, periodically probes the preferred one. A successful
//! probe swaps transports without an intermediate disconnected state.
//!
//! [`EngineSettings`] carries every timeout and cadence. The observable
//! state is published as a [`ConnectionState`].

pub(crate) mod engine;
mod settings;
mod state;

pub(crate) use settings::deadline_after;
pub use settings::{BackoffPolicy, EngineSettings, MAX_INTERVAL, PollSettings};
pub use state::{ConnectionState, LinkState};
