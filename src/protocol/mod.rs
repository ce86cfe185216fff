// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocol spoken with devices.
//!
//! Every message is a JSON envelope with a `msg` type and an ISO-8601
//! `time`:
//!
//! ```text
//! → {root}/{serial}/command         {"msg":"STATE-SET","time":..,"mode-reason":"RAPP","data":{..}}
//! ← {root}/{serial}/status/current  {"msg":"STATE-CHANGE","time":..,"product-state":{"fnsp":["0003","AUTO"]}}
//! ← {root}/{serial}/status/faults   {"msg":"CURRENT-FAULTS","time":..,"product-errors":{..},..}
//! ```
//!
//! - [`encode`] / [`encode_at`]: build outgoing envelopes
//! - [`decode`]: turn an incoming frame into a [`DecodedMessage`]
//! - [`TopicTemplate`]: the configurable topic layout

mod codec;
mod message;
mod topics;

pub use codec::{
    TIME_FORMAT, decode, encode, encode_at, encode_command, encode_command_at, encode_request,
};
pub use message::DecodedMessage;
pub use topics::{TopicSet, TopicTemplate};
