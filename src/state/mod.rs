// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device state management types.
//!
//! The [`StateStore`] holds the authoritative view of one device: its control
//! state, its environmental sensor readings and its latest fault dump.
//! Decoded messages are turned into [`StateChange`]s and applied to it.
//!
//! # Examples
//!
//! ```
//! use applink_lib::state::{StateChange, StateMap, StateStore};
//!
//! let store = StateStore::new();
//!
//! let mut snapshot = StateMap::new();
//! snapshot.insert("fpwr".to_string(), "OFF".to_string());
//! store.apply(&StateChange::Snapshot(snapshot));
//!
//! let mut delta = StateMap::new();
//! delta.insert("fpwr".to_string(), "ON".to_string());
//! let changed = store.apply(&StateChange::Delta(delta));
//!
//! assert_eq!(changed, vec!["fpwr".to_string()]);
//! assert_eq!(store.snapshot().get("fpwr").map(String::as_str), Some("ON"));
//! ```

mod fault;
mod state_change;
mod store;

use std::collections::BTreeMap;

pub use fault::{FaultDiff, FaultRecord, FaultSection, FaultSnapshot, FaultStatus, FaultTransition};
pub use state_change::StateChange;
pub use store::StateStore;

/// Mapping of short device keys to their native string values.
///
/// Ordered so that snapshots and encoded commands are deterministic.
pub type StateMap = BTreeMap<String, String>;
