// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted in-memory connector for engine and device tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Connection, Connector, Frame, Transport, TransportConfig};
use crate::error::TransportError;
use crate::types::ConnectionMode;

/// Result of one scripted connect call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeed,
    Fail,
    Unsupported,
    Hang,
}

/// How a link answers publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublishOutcome {
    Accept,
    Fail,
    Hang,
}

/// A connect call as seen by the connector.
#[derive(Debug, Clone)]
pub(crate) struct Attempt {
    pub mode: ConnectionMode,
    pub host: String,
    pub at: tokio::time::Instant,
}

#[derive(Default)]
struct Script {
    queued: HashMap<ConnectionMode, VecDeque<Outcome>>,
    fallback: HashMap<ConnectionMode, Outcome>,
}

#[derive(Default)]
struct ConnectorInner {
    script: Mutex<Script>,
    attempts: Mutex<Vec<Attempt>>,
    links: Mutex<Vec<MockTransport>>,
}

/// Connector whose outcomes are scripted per mode.
///
/// Queued outcomes are consumed first; afterwards the per-mode default
/// applies (initially [`Outcome::Fail`]).
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    inner: Arc<ConnectorInner>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, mode: ConnectionMode, outcomes: &[Outcome]) -> &Self {
        self.inner
            .script
            .lock()
            .queued
            .entry(mode)
            .or_default()
            .extend(outcomes.iter().copied());
        self
    }

    pub fn always(&self, mode: ConnectionMode, outcome: Outcome) -> &Self {
        self.inner.script.lock().fallback.insert(mode, outcome);
        self
    }

    pub fn attempts(&self) -> Vec<Attempt> {
        self.inner.attempts.lock().clone()
    }

    pub fn attempt_modes(&self) -> Vec<ConnectionMode> {
        self.attempts().iter().map(|a| a.mode).collect()
    }

    pub fn links(&self) -> Vec<MockTransport> {
        self.inner.links.lock().clone()
    }

    pub fn last_link(&self) -> Option<MockTransport> {
        self.inner.links.lock().last().cloned()
    }

    fn next_outcome(&self, mode: ConnectionMode) -> Outcome {
        let mut script = self.inner.script.lock();
        if let Some(outcome) = script.queued.get_mut(&mode).and_then(VecDeque::pop_front) {
            return outcome;
        }
        script.fallback.get(&mode).copied().unwrap_or(Outcome::Fail)
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(
        &self,
        config: &TransportConfig,
    ) -> Result<Connection<MockTransport>, TransportError> {
        let mode = config.mode();
        let host = match config {
            TransportConfig::Local(local) => local.host.clone(),
            TransportConfig::Cloud(cloud) => cloud.endpoint.clone(),
        };
        self.inner.attempts.lock().push(Attempt {
            mode,
            host,
            at: tokio::time::Instant::now(),
        });

        match self.next_outcome(mode) {
            Outcome::Succeed => {
                let (tx, rx) = mpsc::channel(16);
                let link = MockTransport::new(mode, tx);
                self.inner.links.lock().push(link.clone());
                Ok(Connection {
                    transport: link,
                    frames: rx,
                })
            }
            Outcome::Fail => Err(TransportError::ConnectionFailed(format!(
                "scripted {mode} failure"
            ))),
            Outcome::Unsupported => Err(TransportError::Unsupported(
                "scripted protocol refusal".to_string(),
            )),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

struct LinkInner {
    mode: ConnectionMode,
    frames: mpsc::Sender<Frame>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscriptions: Mutex<Vec<String>>,
    closed: CancellationToken,
    closed_by_client: Mutex<bool>,
    publish_outcome: Mutex<PublishOutcome>,
    publish_calls: Mutex<usize>,
}

/// In-memory link recording traffic.
#[derive(Clone)]
pub(crate) struct MockTransport {
    inner: Arc<LinkInner>,
}

impl MockTransport {
    fn new(mode: ConnectionMode, frames: mpsc::Sender<Frame>) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                mode,
                frames,
                published: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
                closed: CancellationToken::new(),
                closed_by_client: Mutex::new(false),
                publish_outcome: Mutex::new(PublishOutcome::Accept),
                publish_calls: Mutex::new(0),
            }),
        }
    }

    pub fn mode(&self) -> ConnectionMode {
        self.inner.mode
    }

    /// Simulates the broker delivering a message.
    pub async fn push(&self, topic: &str, payload: &str) {
        let frame = Frame {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        };
        let _ = self.inner.frames.send(frame).await;
    }

    /// Simulates the broker dropping the link.
    pub fn drop_link(&self) {
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    pub fn closed_by_client(&self) -> bool {
        *self.inner.closed_by_client.lock()
    }

    pub fn set_publish_outcome(&self, outcome: PublishOutcome) {
        *self.inner.publish_outcome.lock() = outcome;
    }

    /// Number of publish calls, including failed and hanging ones.
    pub fn publish_calls(&self) -> usize {
        *self.inner.publish_calls.lock()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.subscriptions.lock().clone()
    }

    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.inner
            .published
            .lock()
            .iter()
            .map(|(topic, payload)| {
                let json = serde_json::from_slice(payload).unwrap_or(serde_json::Value::Null);
                (topic.clone(), json)
            })
            .collect()
    }

    /// Returns the `msg` of every published message.
    pub fn published_msgs(&self) -> Vec<String> {
        self.published()
            .iter()
            .filter_map(|(_, json)| json["msg"].as_str().map(str::to_string))
            .collect()
    }
}

impl Transport for MockTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        *self.inner.publish_calls.lock() += 1;
        if self.is_closed() {
            return Err(TransportError::ChannelClosed("mock link closed".to_string()));
        }
        let outcome = *self.inner.publish_outcome.lock();
        match outcome {
            PublishOutcome::Accept => {}
            PublishOutcome::Fail => {
                return Err(TransportError::ChannelClosed("scripted publish failure".to_string()));
            }
            PublishOutcome::Hang => std::future::pending().await,
        }
        self.inner
            .published
            .lock()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.inner.subscriptions.lock().push(topic.to_string());
        Ok(())
    }

    async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    async fn close(&self) {
        *self.inner.closed_by_client.lock() = true;
        self.inner.closed.cancel();
    }
}
