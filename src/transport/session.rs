// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `rumqttc` session shared by the local and cloud transports.

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::{Connection, Frame, Transport};
use crate::error::TransportError;
use crate::types::ConnectionMode;

/// Capacity of the client request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// An established MQTT session.
///
/// Dropping the session stops its event loop.
pub struct MqttSession {
    client: AsyncClient,
    closed: CancellationToken,
    mode: ConnectionMode,
    _guard: DropGuard,
}

impl MqttSession {
    /// Returns the mode this session was opened for.
    #[must_use]
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Returns `true` once the session has been lost or closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl std::fmt::Debug for MqttSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSession")
            .field("mode", &self.mode)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Transport for MqttSession {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ChannelClosed("MQTT session closed".to_string()));
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        tracing::debug!(mode = %self.mode, topic = %topic, "Published MQTT message");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        tracing::debug!(mode = %self.mode, topic = %topic, "Subscribed to topic");
        Ok(())
    }

    async fn closed(&self) {
        self.closed.cancelled().await;
    }

    async fn close(&self) {
        if self.is_closed() {
            return;
        }
        tracing::info!(mode = %self.mode, "Disconnecting from MQTT broker");
        // Non-blocking: a full request queue must not stall teardown.
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(mode = %self.mode, error = %e, "Disconnect request not queued");
        }
        self.closed.cancel();
    }
}

/// Opens a session and waits for the broker's `CONNACK`.
///
/// The event loop task is tied to the returned session. If this future is
/// dropped early, or the broker refuses the connection, the task stops.
pub(super) async fn open(
    options: MqttOptions,
    mode: ConnectionMode,
    frame_queue_capacity: usize,
) -> Result<Connection<MqttSession>, TransportError> {
    let (client, event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
    let (frames_tx, frames_rx) = mpsc::channel(frame_queue_capacity.max(1));
    let (connack_tx, connack_rx) = oneshot::channel();

    let closed = CancellationToken::new();
    let guard = closed.clone().drop_guard();

    tokio::spawn(handle_session_events(
        event_loop,
        mode,
        frames_tx,
        closed.clone(),
        connack_tx,
    ));

    match connack_rx.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            return Err(TransportError::ConnectionFailed(
                "MQTT event loop terminated unexpectedly".to_string(),
            ));
        }
    }

    tracing::info!(mode = %mode, "Connected to MQTT broker");

    Ok(Connection {
        transport: MqttSession {
            client,
            closed,
            mode,
            _guard: guard,
        },
        frames: frames_rx,
    })
}

/// Drives the `rumqttc` event loop until the session ends.
async fn handle_session_events(
    mut event_loop: EventLoop,
    mode: ConnectionMode,
    frames: mpsc::Sender<Frame>,
    closed: CancellationToken,
    connack_tx: oneshot::Sender<Result<(), TransportError>>,
) {
    let mut connack_tx = Some(connack_tx);

    loop {
        let event = tokio::select! {
            () = closed.cancelled() => break,
            event = event_loop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(mode = %mode, ?connack, "MQTT broker connected");
                let result = match connack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(refusal_error(code)),
                };
                let refused = result.is_err();
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(result);
                }
                if refused {
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(mode = %mode, ?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let frame = Frame {
                    topic: publish.topic,
                    payload: publish.payload.to_vec(),
                };
                match frames.try_send(frame) {
                    Ok(()) => {}
                    Err(TrySendError::Full(frame)) => {
                        tracing::warn!(
                            mode = %mode,
                            topic = %frame.topic,
                            "Frame queue full, dropping message"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(mode = %mode, "Frame receiver dropped");
                        break;
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!(mode = %mode, "MQTT broker disconnected");
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(e) => {
                match connack_tx.take() {
                    Some(tx) => {
                        tracing::debug!(mode = %mode, error = %e, "MQTT connect failed");
                        let _ = tx.send(Err(connection_error(e)));
                    }
                    None => {
                        tracing::warn!(mode = %mode, error = %e, "MQTT event loop error");
                    }
                }
                break;
            }
        }
    }

    closed.cancel();
}

fn refusal_error(code: ConnectReturnCode) -> TransportError {
    match code {
        ConnectReturnCode::RefusedProtocolVersion => {
            TransportError::Unsupported("broker refused MQTT protocol version".to_string())
        }
        ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
            TransportError::AuthenticationFailed
        }
        other => TransportError::ConnectionFailed(format!("broker refused connection: {other:?}")),
    }
}

fn connection_error(error: ConnectionError) -> TransportError {
    match error {
        ConnectionError::ConnectionRefused(code) => refusal_error(code),
        other => TransportError::ConnectionFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_codes_map_to_errors() {
        assert!(refusal_error(ConnectReturnCode::RefusedProtocolVersion).is_unsupported());
        assert!(matches!(
            refusal_error(ConnectReturnCode::BadUserNamePassword),
            TransportError::AuthenticationFailed
        ));
        assert!(matches!(
            refusal_error(ConnectReturnCode::NotAuthorized),
            TransportError::AuthenticationFailed
        ));
        assert!(matches!(
            refusal_error(ConnectReturnCode::ServiceUnavailable),
            TransportError::ConnectionFailed(_)
        ));
    }

    #[test]
    fn refused_connection_error_is_mapped() {
        let err = connection_error(ConnectionError::ConnectionRefused(
            ConnectReturnCode::NotAuthorized,
        ));
        assert!(matches!(err, TransportError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn unreachable_broker_fails_without_hanging() {
        // Port 9 on localhost is expected to refuse immediately.
        let options = MqttOptions::new("applink_test", "127.0.0.1", 9);
        let result = open(options, ConnectionMode::Local, 8).await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }
}
