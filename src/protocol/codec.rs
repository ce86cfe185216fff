// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON envelope encoding and decoding.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::DecodedMessage;
use crate::command::{Command, CommandRequest, PollRequest};
use crate::error::ParseError;
use crate::state::{FaultSection, FaultSnapshot, FaultStatus, StateMap};

/// Timestamp format of the `time` envelope member.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const PRODUCT_STATE: &str = "product-state";
const ENVELOPE_KEYS: [&str; 4] = ["msg", "time", "mode-reason", "state-reason"];

/// Encodes a message stamped with the current time.
#[must_use]
pub fn encode<C: Command + ?Sized>(command: &C) -> Vec<u8> {
    encode_at(command, Utc::now())
}

/// Encodes a message stamped with `time`.
///
/// # Examples
///
/// ```
/// use applink_lib::command::CommandRequest;
/// use applink_lib::protocol::encode_at;
/// use chrono::{TimeZone, Utc};
///
/// let time = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
/// let bytes = encode_at(&CommandRequest::new().set("fpwr", "ON"), time);
/// let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
///
/// assert_eq!(json["msg"], "STATE-SET");
/// assert_eq!(json["time"], "2026-03-01T12:00:00Z");
/// assert_eq!(json["data"]["fpwr"], "ON");
/// ```
#[must_use]
pub fn encode_at<C: Command + ?Sized>(command: &C, time: DateTime<Utc>) -> Vec<u8> {
    let mut envelope = Map::new();
    envelope.insert("msg".to_string(), Value::from(command.msg()));
    envelope.insert(
        "time".to_string(),
        Value::from(time.format(TIME_FORMAT).to_string()),
    );
    if let Some(reason) = command.mode_reason() {
        envelope.insert("mode-reason".to_string(), Value::from(reason));
    }
    if let Some(data) = command.data() {
        let data: Map<String, Value> = data
            .iter()
            .map(|(key, value)| (key.clone(), Value::from(value.as_str())))
            .collect();
        envelope.insert("data".to_string(), Value::Object(data));
    }
    Value::Object(envelope).to_string().into_bytes()
}

/// Encodes a `STATE-SET` command.
#[must_use]
pub fn encode_command(command: &CommandRequest) -> Vec<u8> {
    encode(command)
}

/// Encodes a `STATE-SET` command stamped with `time`.
#[must_use]
pub fn encode_command_at(command: &CommandRequest, time: DateTime<Utc>) -> Vec<u8> {
    encode_at(command, time)
}

/// Encodes a poll request.
#[must_use]
pub fn encode_request(request: PollRequest) -> Vec<u8> {
    encode(&request)
}

/// Decodes an incoming frame.
///
/// Scalars are normalised to strings. `STATE-CHANGE` values arrive as
/// `[previous, current]` pairs and decode to the current value.
///
/// # Errors
///
/// Returns [`ParseError`] if the frame is not a JSON object, has no string
/// `msg`, or misses the payload its `msg` type requires.
pub fn decode(payload: &[u8]) -> Result<DecodedMessage, ParseError> {
    let value: Value = serde_json::from_slice(payload)?;
    let Value::Object(root) = value else {
        return Err(ParseError::UnexpectedFormat(
            "message is not a JSON object".to_string(),
        ));
    };

    let kind = root
        .get("msg")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::MissingField("msg".to_string()))?;

    match kind {
        "CURRENT-STATE" => {
            let state = match root.get(PRODUCT_STATE) {
                Some(Value::Object(state)) => flatten(state),
                Some(_) => return Err(unexpected(PRODUCT_STATE)),
                None => flatten_without_envelope(&root),
            };
            Ok(DecodedMessage::CurrentState(state))
        }
        "STATE-CHANGE" => {
            let changes = required_object(&root, PRODUCT_STATE)?;
            Ok(DecodedMessage::StateChange(flatten(changes)))
        }
        "ENVIRONMENTAL-CURRENT-SENSOR-DATA" => {
            let data = required_object(&root, "data")?;
            Ok(DecodedMessage::EnvironmentalData(flatten(data)))
        }
        "CURRENT-FAULTS" => decode_faults(&root).map(DecodedMessage::CurrentFaults),
        other => Ok(DecodedMessage::Other {
            kind: other.to_string(),
            body: Value::Object(root),
        }),
    }
}

fn decode_faults(root: &Map<String, Value>) -> Result<FaultSnapshot, ParseError> {
    let mut faults = FaultSnapshot::new();
    for section in FaultSection::ALL {
        let Some(entries) = root.get(section.as_str()) else {
            continue;
        };
        let Value::Object(entries) = entries else {
            return Err(unexpected(section.as_str()));
        };
        for (code, status) in entries {
            // Unknown status words are skipped rather than failing the dump.
            if let Some(status) = scalar(status).as_deref().and_then(FaultStatus::parse) {
                faults.insert(section, code.clone(), status);
            }
        }
    }
    Ok(faults)
}

fn required_object<'a>(
    root: &'a Map<String, Value>,
    field: &str,
) -> Result<&'a Map<String, Value>, ParseError> {
    match root.get(field) {
        Some(Value::Object(object)) => Ok(object),
        Some(_) => Err(unexpected(field)),
        None => Err(ParseError::MissingField(field.to_string())),
    }
}

fn unexpected(field: &str) -> ParseError {
    ParseError::UnexpectedFormat(format!("`{field}` is not an object"))
}

fn flatten(object: &Map<String, Value>) -> StateMap {
    object
        .iter()
        .filter_map(|(key, value)| scalar(value).map(|value| (key.clone(), value)))
        .collect()
}

fn flatten_without_envelope(root: &Map<String, Value>) -> StateMap {
    root.iter()
        .filter(|(key, _)| !ENVELOPE_KEYS.contains(&key.as_str()))
        .filter_map(|(key, value)| scalar(value).map(|value| (key.clone(), value)))
        .collect()
}

/// Normalises a JSON value to a state string. Nested objects and nulls are skipped.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.last().and_then(scalar),
        Value::Null | Value::Object(_) => None,
    }
}
