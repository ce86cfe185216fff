// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outgoing message definitions.
//!
//! Two kinds of messages are published on the device command topic:
//!
//! | Type | `msg` | Purpose |
//! |------|-------|---------|
//! | [`CommandRequest`] | `STATE-SET` | Set one or more state keys in a single publish |
//! | [`PollRequest`] | `REQUEST-*` | Ask the device to report state, faults or sensor data |
//!
//! # Examples
//!
//! ```
//! use applink_lib::command::{Command, CommandRequest, PollRequest};
//!
//! let cmd = CommandRequest::new()
//!     .set("oson", "ON")
//!     .set_number("osal", 45, 4)
//!     .set_number("osau", 315, 4);
//!
//! assert_eq!(cmd.msg(), "STATE-SET");
//! assert_eq!(cmd.mode_reason(), Some("RAPP"));
//! assert_eq!(cmd.fields().len(), 3);
//!
//! assert_eq!(PollRequest::CurrentState.msg(), "REQUEST-CURRENT-STATE");
//! ```

mod poll;
mod request;

pub use poll::PollRequest;
pub use request::CommandRequest;

use crate::state::StateMap;

/// A message that can be published to a device.
///
/// The codec wraps the message in the common envelope
/// `{"msg": .., "time": .., "mode-reason": .., "data": ..}`, omitting the
/// optional members when they are `None`.
pub trait Command {
    /// Returns the value of the `msg` field.
    fn msg(&self) -> &'static str;

    /// Returns the `mode-reason` value, if the message carries one.
    fn mode_reason(&self) -> Option<&'static str> {
        None
    }

    /// Returns the `data` payload, if the message carries one.
    fn data(&self) -> Option<&StateMap> {
        None
    }
}
