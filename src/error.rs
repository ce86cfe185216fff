// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `AppLink` library.
//!
//! The hierarchy mirrors how failures are handled by the connection engine:
//!
//! - [`TransportError`]: connect or link failures. Recoverable, they drive
//!   the retry and fallback state machine.
//! - [`ParseError`]: a malformed frame. The frame is dropped, the connection
//!   stays up.
//! - [`CommandError`]: a command could not be published. Returned to the
//!   caller, never retried automatically.
//! - [`Error::UnsupportedDevice`]: the device cannot be driven by this library.
//!   The engine stops after reporting it once.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred while connecting to or talking with a broker.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Error occurred while decoding a device message.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error occurred while sending a command.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// The device is fundamentally incompatible and must not be retried.
    #[error("unsupported device: {0}")]
    UnsupportedDevice(String),

    /// The supplied configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Device was not found in the manager.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A connection engine is already running for this device.
    #[error("device is already connected")]
    AlreadyConnected,

    /// Device is not connected.
    #[error("device is not connected")]
    NotConnected,
}

impl Error {
    /// Returns `true` if retrying can never succeed for this error.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedDevice(_) | Self::InvalidConfiguration(_)
        )
    }
}

/// Errors related to broker connections.
#[derive(Debug, Error)]
pub enum TransportError {
    /// MQTT client request could not be queued.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connection to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation timed out.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Invalid host, endpoint or URL.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The broker rejected the supplied credentials.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Internal channel was closed.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// The broker or device speaks something this library cannot.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Returns `true` if this error means the device can never be reached
    /// through this library, whatever the retry policy.
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}

/// Errors related to decoding device messages.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// Expected field is missing from the message.
    #[error("missing field in message: {0}")]
    MissingField(String),

    /// Unexpected message layout.
    #[error("unexpected message format: {0}")]
    UnexpectedFormat(String),
}

/// Errors related to sending commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No transport is currently connected.
    #[error("device is not connected")]
    NotConnected,

    /// The publish call failed.
    #[error("publish failed: {0}")]
    Publish(#[source] TransportError),

    /// The publish did not complete in time.
    #[error("publish timed out after {0} ms")]
    Timeout(u64),

    /// The command carries no fields.
    #[error("command has no fields")]
    EmptyCommand,
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;
