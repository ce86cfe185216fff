// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Multi-field `STATE-SET` command.

use crate::state::StateMap;

use super::Command;

/// A request to set one or more device state keys.
///
/// All fields are sent in a single `STATE-SET` message. Values use the
/// device's native string encoding (`ON`/`OFF`, zero-padded numbers, enum
/// names). Keys are kept in ascending order so that the encoded payload is
/// stable.
///
/// Commands are not retried automatically: many are not idempotent (e.g.
/// toggling a timer), so retry policy is the caller's choice.
///
/// # Examples
///
/// ```
/// use applink_lib::command::CommandRequest;
///
/// let cmd = CommandRequest::new()
///     .set_switch("fpwr", true)
///     .set_number("fnsp", 3, 4);
///
/// assert_eq!(cmd.get("fpwr"), Some("ON"));
/// assert_eq!(cmd.get("fnsp"), Some("0003"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    fields: StateMap,
}

impl CommandRequest {
    /// Creates an empty command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a raw field value. A later call for the same key replaces it.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Sets an `ON`/`OFF` field.
    #[must_use]
    pub fn set_switch(self, key: impl Into<String>, on: bool) -> Self {
        self.set(key, if on { "ON" } else { "OFF" })
    }

    /// Sets a numeric field, zero-padded to `width` digits.
    #[must_use]
    pub fn set_number(self, key: impl Into<String>, value: u32, width: usize) -> Self {
        self.set(key, format!("{value:0width$}"))
    }

    /// Adds every field of `fields`.
    #[must_use]
    pub fn extend<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Returns the value set for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Returns all fields, in ascending key order.
    #[must_use]
    pub fn fields(&self) -> &StateMap {
        &self.fields
    }

    /// Returns `true` if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Command for CommandRequest {
    fn msg(&self) -> &'static str {
        "STATE-SET"
    }

    fn mode_reason(&self) -> Option<&'static str> {
        Some("RAPP")
    }

    fn data(&self) -> Option<&StateMap> {
        Some(&self.fields)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CommandRequest {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new().extend(iter)
    }
}
