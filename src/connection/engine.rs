// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device connection engine.
//!
//! One tokio task per device owns the live transport and every timer of the
//! device: the local retry sequence, the background reconnect loop, the
//! return-to-preferred probe and the poll timers. Connect attempts run in a
//! child task so the engine keeps draining frames while a probe is under way.
//! At most one attempt is in flight at any time.
//!
//! ```text
//!                 cycle ok                      link lost
//!  Disconnected ───────────▶ Connected(mode) ─────────────▶ Connecting(preferred)
//!       ▲                     │        ▲                          │
//!       │ cycle failed        │ probe  │ swap                     │ ...fallback
//!       └── backoff timer ◀───┘ timer  └──────── probe ok ◀───────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{ConnectionState, EngineSettings, deadline_after};
use crate::command::{CommandRequest, PollRequest};
use crate::error::{CommandError, Error, TransportError};
use crate::event::{DeviceEvent, EventBus};
use crate::polling::PollingScheduler;
use crate::protocol::{self, DecodedMessage, TopicSet, TopicTemplate};
use crate::state::StateStore;
use crate::subscription::CallbackRegistry;
use crate::transport::{
    Connection, Connector, DeviceCredentials, Frame, HostResolver, Transport, TransportConfig,
    resolve_local_host,
};
use crate::types::{ConnectionMode, ConnectionPolicy, ConnectionStatus, DeviceSerial};

/// Capacity of the control channel into the engine.
const CONTROL_CHANNEL_CAPACITY: usize = 8;

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The live transport, shared with command senders.
pub(crate) struct ActiveLink<T> {
    pub(crate) mode: ConnectionMode,
    pub(crate) transport: Arc<T>,
    pub(crate) topics: TopicSet,
}

/// Everything a device shares with its engine.
pub(crate) struct DeviceContext<T> {
    pub(crate) serial: DeviceSerial,
    pub(crate) settings: EngineSettings,
    pub(crate) topics: TopicTemplate,
    pub(crate) store: StateStore,
    pub(crate) events: EventBus,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) active: RwLock<Option<ActiveLink<T>>>,
    pub(crate) static_host: RwLock<Option<String>>,
    pub(crate) resolver: Option<Arc<dyn HostResolver>>,
}

impl<T: Transport> DeviceContext<T> {
    pub(crate) fn new(
        serial: DeviceSerial,
        settings: EngineSettings,
        topics: TopicTemplate,
        events: EventBus,
        resolver: Option<Arc<dyn HostResolver>>,
        static_host: Option<String>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::new(ConnectionMode::Local));
        Self {
            serial,
            settings,
            topics,
            store: StateStore::new(),
            events,
            callbacks: CallbackRegistry::new(),
            state,
            active: RwLock::new(None),
            static_host: RwLock::new(static_host),
            resolver,
        }
    }

    /// Delivers an event to callbacks and the bus.
    pub(crate) fn emit(&self, event: DeviceEvent) {
        self.callbacks.dispatch(&event);
        self.events.publish(event);
    }

    fn update_state(&self, f: impl FnOnce(&mut ConnectionState)) -> ConnectionState {
        self.state.send_modify(f);
        self.state.borrow().clone()
    }

    pub(crate) fn connection_status(&self) -> ConnectionStatus {
        self.state.borrow().current
    }

    fn local_host(&self) -> String {
        let static_host = self.static_host.read().clone();
        resolve_local_host(
            static_host.as_deref(),
            self.resolver.as_deref(),
            &self.serial,
        )
    }

    /// Publishes on the command topic of the live link, bounded by the
    /// command timeout of its mode.
    pub(crate) async fn publish(&self, payload: Vec<u8>) -> Result<ConnectionMode, CommandError> {
        let (transport, topic, mode) = {
            let active = self.active.read();
            let link = active.as_ref().ok_or(CommandError::NotConnected)?;
            (
                Arc::clone(&link.transport),
                link.topics.command.clone(),
                link.mode,
            )
        };

        let timeout = self.settings.command_timeout(mode);
        match tokio::time::timeout(timeout, transport.publish(&topic, payload)).await {
            Ok(Ok(())) => Ok(mode),
            Ok(Err(e)) => Err(CommandError::Publish(e)),
            Err(_) => Err(CommandError::Timeout(millis(timeout))),
        }
    }

    pub(crate) async fn send_command(&self, command: &CommandRequest) -> Result<(), CommandError> {
        if command.is_empty() {
            return Err(CommandError::EmptyCommand);
        }
        let mode = self.publish(protocol::encode_command(command)).await?;
        tracing::debug!(
            serial = %self.serial,
            mode = %mode,
            fields = command.fields().len(),
            "Sent command"
        );
        Ok(())
    }
}

/// Requests into a running engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    ReconnectPreferred,
}

/// Handle on a spawned engine.
pub(crate) struct EngineHandle {
    control: mpsc::Sender<Control>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub(crate) fn request(&self, control: Control) -> bool {
        self.control.try_send(control).is_ok()
    }

    /// Stops the engine and waits until its transport is closed.
    pub(crate) async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.task).await {
            tracing::warn!(error = %e, "Connection engine task failed");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Outcome of the first attempt cycle of an engine.
pub(crate) type FirstOutcome = oneshot::Sender<Result<ConnectionStatus, Error>>;

/// Spawns the engine of one device.
pub(crate) fn spawn<C: Connector>(
    ctx: Arc<DeviceContext<C::Transport>>,
    connector: Arc<C>,
    policy: ConnectionPolicy,
    credentials: DeviceCredentials,
    first: FirstOutcome,
) -> EngineHandle {
    let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    ctx.state
        .send_replace(ConnectionState::new(policy.preferred()));

    let engine = Engine {
        poller: PollingScheduler::new(ctx.settings.polling.clone()),
        ctx,
        connector,
        policy,
        credentials: Arc::new(credentials),
        cancel: cancel.clone(),
        control: control_rx,
        current: None,
        frames: None,
        pending: None,
        reconnect_at: None,
        reconnect_attempts: 0,
        probe_at: None,
        first: Some(first),
    };
    let task = tokio::spawn(engine.run());

    EngineHandle {
        control: control_tx,
        cancel,
        task,
    }
}

/// A connect attempt that reached the broker and subscribed.
struct Established<T> {
    mode: ConnectionMode,
    connection: Connection<T>,
    topics: TopicSet,
}

type AttemptResult<T> = Result<Established<T>, TransportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptKind {
    /// Walks the policy order while disconnected.
    Cycle,
    /// Tries the preferred mode next to a live fallback link.
    Probe,
}

struct PendingAttempt<T> {
    kind: AttemptKind,
    task: JoinHandle<AttemptResult<T>>,
}

enum Wake<T> {
    Shutdown,
    Control(Control),
    Frame(Option<Frame>),
    LinkLost,
    Poll(PollRequest),
    Attempt(AttemptKind, Result<AttemptResult<T>, JoinError>),
    Reconnect,
    Probe,
}

enum Flow {
    Continue,
    Stop,
}

struct Engine<C: Connector> {
    ctx: Arc<DeviceContext<C::Transport>>,
    connector: Arc<C>,
    policy: ConnectionPolicy,
    credentials: Arc<DeviceCredentials>,
    cancel: CancellationToken,
    control: mpsc::Receiver<Control>,
    current: Option<Arc<C::Transport>>,
    frames: Option<mpsc::Receiver<Frame>>,
    poller: PollingScheduler,
    pending: Option<PendingAttempt<C::Transport>>,
    reconnect_at: Option<Instant>,
    reconnect_attempts: u32,
    probe_at: Option<Instant>,
    first: Option<FirstOutcome>,
}

impl<C: Connector> Engine<C> {
    async fn run(mut self) {
        tracing::debug!(
            serial = %self.ctx.serial,
            policy = ?self.policy,
            "Starting connection engine"
        );
        self.start_attempt(AttemptKind::Cycle);

        loop {
            let wake = tokio::select! {
                () = self.cancel.cancelled() => Wake::Shutdown,
                control = self.control.recv() => control.map_or(Wake::Shutdown, Wake::Control),
                frame = next_frame(&mut self.frames) => Wake::Frame(frame),
                () = link_closed(self.current.as_deref()) => Wake::LinkLost,
                request = self.poller.tick() => Wake::Poll(request),
                (kind, result) = join_attempt(&mut self.pending) => Wake::Attempt(kind, result),
                () = sleep_until(self.reconnect_at) => Wake::Reconnect,
                () = sleep_until(self.probe_at) => Wake::Probe,
            };

            let flow = match wake {
                Wake::Shutdown => Flow::Stop,
                Wake::Control(Control::ReconnectPreferred) => {
                    self.reconnect_preferred();
                    Flow::Continue
                }
                Wake::Frame(Some(frame)) => {
                    self.handle_frame(&frame);
                    Flow::Continue
                }
                Wake::Frame(None) | Wake::LinkLost => {
                    self.link_lost().await;
                    Flow::Continue
                }
                Wake::Poll(request) => {
                    self.send_request(request).await;
                    Flow::Continue
                }
                Wake::Attempt(kind, result) => {
                    self.pending = None;
                    let result = result.unwrap_or_else(|e| {
                        Err(TransportError::ConnectionFailed(format!(
                            "connect task failed: {e}"
                        )))
                    });
                    self.attempt_finished(kind, result).await
                }
                Wake::Reconnect => {
                    self.reconnect_at = None;
                    self.start_attempt(AttemptKind::Cycle);
                    Flow::Continue
                }
                Wake::Probe => {
                    self.probe_at = None;
                    self.start_probe();
                    Flow::Continue
                }
            };

            if matches!(flow, Flow::Stop) {
                break;
            }
        }

        self.teardown().await;
    }

    // =========================================================================
    // Attempts
    // =========================================================================

    fn start_attempt(&mut self, kind: AttemptKind) {
        if self.pending.is_some() {
            return;
        }
        let order: Vec<ConnectionMode> = match kind {
            AttemptKind::Cycle => self
                .policy
                .attempt_order()
                .iter()
                .copied()
                .filter(|mode| self.credentials.supports(*mode))
                .collect(),
            AttemptKind::Probe => vec![self.policy.preferred()],
        };

        let task = tokio::spawn(run_attempts(
            Arc::clone(&self.ctx),
            Arc::clone(&self.connector),
            Arc::clone(&self.credentials),
            order,
        ));
        self.pending = Some(PendingAttempt { kind, task });
    }

    fn start_probe(&mut self) {
        let state = self.ctx.state.borrow().clone();
        if !state.is_connected() || !state.fallback_active {
            return;
        }
        if self.pending.is_some() {
            tracing::debug!(serial = %self.ctx.serial, "Attempt already in flight, probe skipped");
            return;
        }

        tracing::info!(
            serial = %self.ctx.serial,
            preferred = %state.preferred_mode,
            "Trying to return to preferred transport"
        );
        self.ctx
            .update_state(|s| s.last_preferred_retry_at = Some(chrono::Utc::now()));
        self.start_attempt(AttemptKind::Probe);
    }

    fn reconnect_preferred(&mut self) {
        if self.pending.is_some() {
            tracing::debug!(serial = %self.ctx.serial, "Attempt already in flight, request ignored");
            return;
        }
        let state = self.ctx.state.borrow().clone();
        if !state.is_connected() {
            // Skip the remaining backoff; the cycle starts with the preferred mode.
            self.reconnect_at = None;
            self.start_attempt(AttemptKind::Cycle);
        } else if state.fallback_active {
            self.probe_at = None;
            self.start_probe();
        } else {
            tracing::debug!(serial = %self.ctx.serial, "Already on preferred transport");
        }
    }

    async fn attempt_finished(
        &mut self,
        kind: AttemptKind,
        result: AttemptResult<C::Transport>,
    ) -> Flow {
        match (kind, result) {
            (_, Ok(established)) => {
                self.install(established).await;
                Flow::Continue
            }
            (_, Err(e)) if e.is_unsupported() => {
                self.unsupported(&e);
                Flow::Stop
            }
            (AttemptKind::Cycle, Err(e)) => {
                self.cycle_failed(e);
                Flow::Continue
            }
            (AttemptKind::Probe, Err(e)) => {
                let interval = self.ctx.settings.preferred_retry_interval;
                tracing::info!(
                    serial = %self.ctx.serial,
                    error = %e,
                    retry_in = ?interval,
                    "Preferred transport still unavailable"
                );
                self.probe_at = Some(deadline_after(interval));
                Flow::Continue
            }
        }
    }

    /// Makes an established connection the live link, closing any previous one.
    async fn install(&mut self, established: Established<C::Transport>) {
        let Established {
            mode,
            connection,
            topics,
        } = established;
        let Connection { transport, frames } = connection;
        let transport = Arc::new(transport);

        let previous = self.ctx.active.write().replace(ActiveLink {
            mode,
            transport: Arc::clone(&transport),
            topics,
        });
        self.current = Some(transport);
        self.frames = Some(frames);
        if let Some(previous) = previous {
            tracing::info!(
                serial = %self.ctx.serial,
                from = %previous.mode,
                to = %mode,
                "Swapping transport"
            );
            previous.transport.close().await;
        }

        self.reconnect_at = None;
        self.reconnect_attempts = 0;
        let state = self.ctx.update_state(|s| s.set_connected(mode));
        tracing::info!(
            serial = %self.ctx.serial,
            mode = %mode,
            fallback = state.fallback_active,
            "Device connected"
        );
        self.ctx.emit(DeviceEvent::ConnectionChanged {
            serial: self.ctx.serial.clone(),
            status: state.current,
            fallback_active: state.fallback_active,
        });

        self.probe_at = state
            .fallback_active
            .then(|| deadline_after(self.ctx.settings.preferred_retry_interval));

        for request in self.poller.resume() {
            self.send_request(request).await;
        }

        if let Some(first) = self.first.take() {
            let _ = first.send(Ok(state.current));
        }
    }

    fn cycle_failed(&mut self, error: TransportError) {
        let state = self.ctx.update_state(ConnectionState::record_failure);
        let reconnect = &self.ctx.settings.reconnect;

        tracing::warn!(
            serial = %self.ctx.serial,
            error = %error,
            failures = state.consecutive_failures,
            "All connection attempts failed"
        );
        self.ctx.emit(DeviceEvent::ConnectionFailed {
            serial: self.ctx.serial.clone(),
            error: error.to_string(),
            consecutive_failures: state.consecutive_failures,
        });

        if reconnect.should_retry(self.reconnect_attempts) {
            let delay = reconnect.delay_for_attempt(self.reconnect_attempts);
            self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
            tracing::debug!(serial = %self.ctx.serial, delay = ?delay, "Scheduling reconnect");
            self.reconnect_at = Some(deadline_after(delay));
        } else {
            tracing::warn!(serial = %self.ctx.serial, "Reconnect attempts exhausted");
        }

        if let Some(first) = self.first.take() {
            let _ = first.send(Err(Error::Transport(error)));
        }
    }

    fn unsupported(&mut self, error: &TransportError) {
        let reason = match error {
            TransportError::Unsupported(reason) => reason.clone(),
            other => other.to_string(),
        };
        tracing::error!(serial = %self.ctx.serial, reason = %reason, "Device unsupported, stopping");
        self.ctx.emit(DeviceEvent::Unsupported {
            serial: self.ctx.serial.clone(),
            reason: reason.clone(),
        });
        if let Some(first) = self.first.take() {
            let _ = first.send(Err(Error::UnsupportedDevice(reason)));
        }
    }

    // =========================================================================
    // Live link
    // =========================================================================

    async fn link_lost(&mut self) {
        let Some(transport) = self.current.take() else {
            return;
        };
        self.frames = None;
        self.poller.suspend();
        self.probe_at = None;
        *self.ctx.active.write() = None;
        transport.close().await;

        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }

        let state = self.ctx.update_state(ConnectionState::set_disconnected);
        tracing::warn!(serial = %self.ctx.serial, "Connection lost, reconnecting");
        self.ctx.emit(DeviceEvent::ConnectionChanged {
            serial: self.ctx.serial.clone(),
            status: ConnectionStatus::Disconnected,
            fallback_active: state.fallback_active,
        });

        self.reconnect_attempts = 0;
        self.start_attempt(AttemptKind::Cycle);
    }

    fn handle_frame(&self, frame: &Frame) {
        let ctx = &self.ctx;
        let message = match protocol::decode(&frame.payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    serial = %ctx.serial,
                    topic = %frame.topic,
                    error = %e,
                    "Dropping malformed frame"
                );
                return;
            }
        };
        tracing::debug!(serial = %ctx.serial, kind = message.kind(), "Message received");

        match message {
            DecodedMessage::CurrentFaults(faults) => {
                let diff = ctx.store.apply_fault_snapshot(faults);
                if !diff.is_empty() {
                    ctx.emit(DeviceEvent::FaultsChanged {
                        serial: ctx.serial.clone(),
                        diff,
                    });
                }
            }
            DecodedMessage::Other { kind, .. } => {
                tracing::trace!(serial = %ctx.serial, kind = %kind, "Unrecognised message type");
                ctx.emit(DeviceEvent::MessageReceived {
                    serial: ctx.serial.clone(),
                    kind,
                });
            }
            message => {
                let Some(change) = message.into_state_change() else {
                    return;
                };
                let changed_keys = ctx.store.apply(&change);
                if changed_keys.is_empty() {
                    return;
                }
                let event = if change.is_environment() {
                    DeviceEvent::EnvironmentChanged {
                        serial: ctx.serial.clone(),
                        environment: ctx.store.environment(),
                        changed_keys,
                    }
                } else {
                    DeviceEvent::StateChanged {
                        serial: ctx.serial.clone(),
                        state: ctx.store.snapshot(),
                        changed_keys,
                    }
                };
                ctx.emit(event);
            }
        }
    }

    async fn send_request(&self, request: PollRequest) {
        match self.ctx.publish(protocol::encode_request(request)).await {
            Ok(_) => tracing::trace!(serial = %self.ctx.serial, ?request, "Poll request sent"),
            Err(e) => {
                tracing::warn!(serial = %self.ctx.serial, ?request, error = %e, "Poll request failed");
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.task.abort();
        }
        self.reconnect_at = None;
        self.probe_at = None;
        self.poller.suspend();
        self.frames = None;

        let active = self.ctx.active.write().take();
        self.current = None;
        if let Some(link) = active {
            link.transport.close().await;
        }

        let previous = self.ctx.state.borrow().current;
        let state = self.ctx.update_state(ConnectionState::set_disconnected);
        if previous.is_connected() {
            self.ctx.emit(DeviceEvent::ConnectionChanged {
                serial: self.ctx.serial.clone(),
                status: ConnectionStatus::Disconnected,
                fallback_active: state.fallback_active,
            });
        }
        if let Some(first) = self.first.take() {
            let _ = first.send(Err(Error::NotConnected));
        }
        tracing::info!(serial = %self.ctx.serial, "Connection engine stopped");
    }
}

// =============================================================================
// Attempt task
// =============================================================================

/// Tries each mode of `order` until one connects.
async fn run_attempts<C: Connector>(
    ctx: Arc<DeviceContext<C::Transport>>,
    connector: Arc<C>,
    credentials: Arc<DeviceCredentials>,
    order: Vec<ConnectionMode>,
) -> AttemptResult<C::Transport> {
    let mut last_error = None;
    for mode in order {
        match attempt_mode(&ctx, connector.as_ref(), &credentials, mode).await {
            Ok(established) => return Ok(established),
            Err(e) if e.is_unsupported() => return Err(e),
            Err(e) => {
                tracing::warn!(serial = %ctx.serial, mode = %mode, error = %e, "Connection attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        TransportError::ConnectionFailed("no connection mode has credentials".to_string())
    }))
}

/// One attempt against `mode`. Local attempts retry on the local backoff
/// sequence, resolving the host again before every try.
async fn attempt_mode<C: Connector>(
    ctx: &DeviceContext<C::Transport>,
    connector: &C,
    credentials: &DeviceCredentials,
    mode: ConnectionMode,
) -> AttemptResult<C::Transport> {
    ctx.update_state(|s| s.set_connecting(mode));

    match mode {
        ConnectionMode::Cloud => {
            let cloud = credentials.cloud.as_ref().ok_or_else(|| {
                TransportError::ConnectionFailed("no cloud credentials".to_string())
            })?;
            connect_once(ctx, connector, &TransportConfig::Cloud(cloud.clone())).await
        }
        ConnectionMode::Local => {
            let local = credentials.local.as_ref().ok_or_else(|| {
                TransportError::ConnectionFailed("no local credentials".to_string())
            })?;
            let retry = &ctx.settings.local_retry;
            let mut tries = 0u32;
            loop {
                let config = TransportConfig::Local(local.to_config(ctx.local_host(), &ctx.serial));
                let error = match connect_once(ctx, connector, &config).await {
                    Ok(established) => return Ok(established),
                    Err(e) if e.is_unsupported() => return Err(e),
                    Err(e) => e,
                };
                tries += 1;
                if !retry.should_retry(tries) {
                    return Err(error);
                }
                let delay = retry.delay_for_attempt(tries - 1);
                tracing::debug!(
                    serial = %ctx.serial,
                    attempt = tries,
                    delay = ?delay,
                    error = %error,
                    "Local broker not ready, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn connect_once<C: Connector>(
    ctx: &DeviceContext<C::Transport>,
    connector: &C,
    config: &TransportConfig,
) -> AttemptResult<C::Transport> {
    let mode = config.mode();
    let timeout = ctx.settings.connect_timeout(mode);
    let connection = tokio::time::timeout(timeout, connector.connect(config))
        .await
        .map_err(|_| TransportError::Timeout(millis(timeout)))??;

    let topics = ctx.topics.render(config.root_topic(), &ctx.serial);
    for topic in topics.subscriptions() {
        if let Err(e) = connection.transport.subscribe(topic).await {
            connection.transport.close().await;
            return Err(e);
        }
    }

    Ok(Established {
        mode,
        connection,
        topics,
    })
}

// =============================================================================
// Select helpers
// =============================================================================

async fn next_frame(frames: &mut Option<mpsc::Receiver<Frame>>) -> Option<Frame> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn link_closed<T: Transport>(transport: Option<&T>) {
    match transport {
        Some(transport) => transport.closed().await,
        None => std::future::pending().await,
    }
}

async fn join_attempt<T>(
    pending: &mut Option<PendingAttempt<T>>,
) -> (AttemptKind, Result<AttemptResult<T>, JoinError>) {
    match pending {
        Some(pending) => (pending.kind, (&mut pending.task).await),
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{BackoffPolicy, LinkState};
    use crate::transport::mock::{MockConnector, MockTransport, Outcome, PublishOutcome};
    use crate::transport::{CloudConfig, LocalCredentials};
    use tokio::sync::broadcast;

    use ConnectionMode::{Cloud, Local};

    const SERIAL: &str = "XX9-EU-ABC1234A";

    fn context(settings: EngineSettings) -> Arc<DeviceContext<MockTransport>> {
        Arc::new(DeviceContext::new(
            DeviceSerial::new(SERIAL),
            settings,
            TopicTemplate::default(),
            EventBus::new(),
            None,
            Some("192.168.1.40".to_string()),
        ))
    }

    fn credentials() -> DeviceCredentials {
        DeviceCredentials::local(LocalCredentials::new("device-credential", "527")).with_cloud(
            CloudConfig::new("iot.example.com", "client-1", "tok", "sig", "527"),
        )
    }

    /// Settings with a single local attempt per cycle.
    fn quick_settings() -> EngineSettings {
        EngineSettings::default().with_local_retry(BackoffPolicy::local_retry().with_max_attempts(1))
    }

    async fn start(
        ctx: &Arc<DeviceContext<MockTransport>>,
        connector: &MockConnector,
        policy: ConnectionPolicy,
    ) -> (EngineHandle, Result<ConnectionStatus, Error>) {
        let (tx, rx) = oneshot::channel();
        let handle = spawn(
            Arc::clone(ctx),
            Arc::new(connector.clone()),
            policy,
            credentials(),
            tx,
        );
        let first = rx.await.expect("engine reports its first cycle");
        (handle, first)
    }

    async fn next_connection_event(rx: &mut broadcast::Receiver<DeviceEvent>) -> DeviceEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(3600), rx.recv())
                .await
                .expect("event before timeout")
                .expect("bus open");
            if event.is_connection() {
                return event;
            }
        }
    }

    async fn next_status(rx: &mut broadcast::Receiver<DeviceEvent>) -> ConnectionStatus {
        loop {
            if let DeviceEvent::ConnectionChanged { status, .. } = next_connection_event(rx).await {
                return status;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn local_retries_before_cloud_fallback() {
        let ctx = context(EngineSettings::default());
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Fail).always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;

        assert_eq!(first.unwrap(), ConnectionStatus::Cloud);
        assert_eq!(
            connector.attempt_modes(),
            vec![Local, Local, Local, Local, Local, Cloud]
        );

        let attempts = connector.attempts();
        let gaps: Vec<u64> = attempts
            .windows(2)
            .take(4)
            .map(|w| (w[1].at - w[0].at).as_secs())
            .collect();
        assert_eq!(gaps, vec![1, 2, 4, 8]);
        assert!(attempts[..5].iter().all(|a| a.host == "192.168.1.40"));

        let state = ctx.state.borrow().clone();
        assert!(state.fallback_active);
        assert_eq!(state.preferred_mode, Local);
        assert_eq!(state.phase, LinkState::Connected(Cloud));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn local_only_succeeds_within_retry_sequence() {
        let ctx = context(EngineSettings::default());
        let connector = MockConnector::new();
        connector
            .queue(Local, &[Outcome::Fail, Outcome::Fail, Outcome::Fail])
            .always(Local, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalOnly).await;

        assert_eq!(first.unwrap(), ConnectionStatus::Local);
        assert_eq!(connector.attempt_modes(), vec![Local; 4]);
        let state = ctx.state.borrow().clone();
        assert_eq!(state.phase, LinkState::Connected(Local));
        assert!(!state.fallback_active);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cloud_preferred_falls_back_to_local() {
        let ctx = context(EngineSettings::default());
        let connector = MockConnector::new();
        connector.always(Cloud, Outcome::Fail).always(Local, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::CloudWithLocalFallback).await;

        assert_eq!(first.unwrap(), ConnectionStatus::Local);
        assert_eq!(connector.attempt_modes(), vec![Cloud, Local]);
        let state = ctx.state.borrow().clone();
        assert_eq!(state.phase, LinkState::Connected(Local));
        assert!(state.fallback_active);
        assert_eq!(state.preferred_mode, Cloud);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_loss_tries_preferred_before_fallback() {
        let ctx = context(quick_settings());
        let mut events = ctx.events.subscribe();
        let connector = MockConnector::new();
        connector
            .queue(Local, &[Outcome::Fail])
            .always(Local, Outcome::Succeed)
            .always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;
        assert_eq!(first.unwrap(), ConnectionStatus::Cloud);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Cloud);

        let lost_at = tokio::time::Instant::now();
        connector.last_link().unwrap().drop_link();

        assert_eq!(next_status(&mut events).await, ConnectionStatus::Disconnected);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Local);

        let attempts = connector.attempts();
        assert_eq!(connector.attempt_modes(), vec![Local, Cloud, Local]);
        assert_eq!(attempts[2].at, lost_at);
        assert!(!ctx.state.borrow().fallback_active);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cloud_preferred_never_tried_after_local() {
        let ctx = context(quick_settings());
        let connector = MockConnector::new();
        connector.always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::CloudWithLocalFallback).await;

        assert_eq!(first.unwrap(), ConnectionStatus::Cloud);
        assert_eq!(connector.attempt_modes(), vec![Cloud]);
        assert!(!ctx.state.borrow().fallback_active);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn subscribes_and_polls_on_connect() {
        let ctx = context(quick_settings());
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalOnly).await;
        assert_eq!(first.unwrap(), ConnectionStatus::Local);

        let link = connector.last_link().unwrap();
        assert_eq!(
            link.subscriptions(),
            vec![
                format!("527/{SERIAL}/status/current"),
                format!("527/{SERIAL}/status/faults"),
            ]
        );
        assert_eq!(
            link.published_msgs(),
            vec![
                "REQUEST-CURRENT-STATE",
                "REQUEST-PRODUCT-ENVIRONMENT-CURRENT-SENSOR-DATA",
                "REQUEST-CURRENT-FAULTS",
            ]
        );
        assert!(
            link.published()
                .iter()
                .all(|(topic, _)| *topic == format!("527/{SERIAL}/command"))
        );

        // Next state poll after one state interval.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(link.published_msgs().len(), 4);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn probe_swaps_back_to_preferred_without_gap() {
        let ctx = context(quick_settings().with_preferred_retry_interval(Duration::from_secs(60)));
        let mut events = ctx.events.subscribe();
        let connector = MockConnector::new();
        connector
            .queue(Local, &[Outcome::Fail, Outcome::Fail])
            .always(Local, Outcome::Succeed)
            .always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;
        assert_eq!(first.unwrap(), ConnectionStatus::Cloud);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Cloud);

        // First probe fails, the second one succeeds.
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Local);

        let attempts = connector.attempts();
        assert_eq!(connector.attempt_modes(), vec![Local, Cloud, Local, Local]);
        assert_eq!((attempts[2].at - attempts[1].at).as_secs(), 60);
        assert_eq!((attempts[3].at - attempts[2].at).as_secs(), 60);

        let links = connector.links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].mode(), Cloud);
        assert!(links[0].closed_by_client());
        assert!(!links[1].is_closed());

        let state = ctx.state.borrow().clone();
        assert!(!state.fallback_active);
        assert!(state.last_preferred_retry_at.is_some());
        assert_eq!(ctx.connection_status(), ConnectionStatus::Local);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_link_keeps_serving_during_probe() {
        let ctx = context(quick_settings().with_preferred_retry_interval(Duration::from_secs(60)));
        let connector = MockConnector::new();
        connector
            .queue(Local, &[Outcome::Fail])
            .always(Local, Outcome::Hang)
            .always(Cloud, Outcome::Succeed);

        let (handle, _) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;
        let cloud = connector.last_link().unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(connector.attempt_modes(), vec![Local, Cloud, Local]);

        let command = CommandRequest::new().set_switch("fpwr", true);
        ctx.send_command(&command).await.unwrap();
        assert!(cloud.published_msgs().contains(&"STATE-SET".to_string()));
        assert_eq!(ctx.connection_status(), ConnectionStatus::Cloud);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_override_probes_immediately() {
        let ctx = context(quick_settings());
        let mut events = ctx.events.subscribe();
        let connector = MockConnector::new();
        connector
            .queue(Local, &[Outcome::Fail])
            .always(Local, Outcome::Succeed)
            .always(Cloud, Outcome::Succeed);

        let (handle, _) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Cloud);

        let before = tokio::time::Instant::now();
        assert!(handle.request(Control::ReconnectPreferred));
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Local);
        assert!(before.elapsed() < Duration::from_secs(1));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_reconnects_preferred_first() {
        let ctx = context(quick_settings());
        let mut events = ctx.events.subscribe();
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Succeed).always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;
        assert_eq!(first.unwrap(), ConnectionStatus::Local);
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Local);

        connector.last_link().unwrap().drop_link();

        assert_eq!(
            next_status(&mut events).await,
            ConnectionStatus::Disconnected
        );
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Local);
        assert_eq!(connector.attempt_modes(), vec![Local, Local]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_reports_and_backs_off() {
        let ctx = context(quick_settings());
        let mut events = ctx.events.subscribe();
        let connector = MockConnector::new();
        connector.queue(Cloud, &[Outcome::Fail]).always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;
        assert!(matches!(first, Err(Error::Transport(_))));

        match next_connection_event(&mut events).await {
            DeviceEvent::ConnectionFailed {
                consecutive_failures,
                ..
            } => assert_eq!(consecutive_failures, 1),
            other => panic!("unexpected event: {other:?}"),
        }

        // Reconnect after the first backoff step.
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Cloud);
        let attempts = connector.attempts();
        assert_eq!(connector.attempt_modes(), vec![Local, Cloud, Local, Cloud]);
        assert_eq!((attempts[2].at - attempts[1].at).as_secs(), 5);
        assert_eq!(ctx.state.borrow().consecutive_failures, 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_stops_without_fallback() {
        let ctx = context(quick_settings());
        let mut events = ctx.events.subscribe();
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Unsupported).always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;

        assert!(matches!(first, Err(Error::UnsupportedDevice(_))));
        assert!(matches!(
            next_connection_event(&mut events).await,
            DeviceEvent::Unsupported { .. }
        ));

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_modes(), vec![Local]);
        assert!(!handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn frames_update_store_and_emit() {
        let ctx = context(quick_settings());
        let mut events = ctx.events.subscribe();
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Succeed);

        let (handle, _) = start(&ctx, &connector, ConnectionPolicy::LocalOnly).await;
        let link = connector.last_link().unwrap();
        let topic = format!("527/{SERIAL}/status/current");

        link.push(&topic, "not json").await;
        link.push(
            &topic,
            r#"{"msg":"CURRENT-STATE","product-state":{"fpwr":"ON","fnsp":"0004"}}"#,
        )
        .await;
        link.push(
            &topic,
            r#"{"msg":"STATE-CHANGE","product-state":{"fnsp":["0004","0006"]}}"#,
        )
        .await;
        link.push(&topic, r#"{"msg":"LOCATION","data":{}}"#).await;

        let mut seen = Vec::new();
        while seen.len() < 3 {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .unwrap()
                .unwrap();
            if !event.is_connection() {
                seen.push(event);
            }
        }

        match &seen[0] {
            DeviceEvent::StateChanged { changed_keys, .. } => {
                assert_eq!(changed_keys, &vec!["fnsp".to_string(), "fpwr".to_string()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match &seen[1] {
            DeviceEvent::StateChanged {
                state,
                changed_keys,
                ..
            } => {
                assert_eq!(changed_keys, &vec!["fnsp".to_string()]);
                assert_eq!(state.get("fnsp").map(String::as_str), Some("0006"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            &seen[2],
            DeviceEvent::MessageReceived { kind, .. } if kind == "LOCATION"
        ));
        assert_eq!(ctx.store.get("fpwr").as_deref(), Some("ON"));
        assert!(ctx.connection_status().is_connected());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_link_and_reports_disconnect() {
        let ctx = context(quick_settings());
        let mut events = ctx.events.subscribe();
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Succeed);

        let (handle, _) = start(&ctx, &connector, ConnectionPolicy::LocalOnly).await;
        assert_eq!(next_status(&mut events).await, ConnectionStatus::Local);

        handle.shutdown().await;

        assert!(connector.last_link().unwrap().closed_by_client());
        assert_eq!(
            next_status(&mut events).await,
            ConnectionStatus::Disconnected
        );
        assert_eq!(ctx.connection_status(), ConnectionStatus::Disconnected);
        assert!(ctx.active.read().is_none());
        assert!(matches!(
            ctx.send_command(&CommandRequest::new().set("fpwr", "OFF")).await,
            Err(CommandError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_command_rejected_before_publish() {
        let ctx = context(quick_settings());
        assert!(matches!(
            ctx.send_command(&CommandRequest::new()).await,
            Err(CommandError::EmptyCommand)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_local_attempt_times_out_into_cloud() {
        let ctx = context(quick_settings());
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Hang).always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;

        assert_eq!(first.unwrap(), ConnectionStatus::Cloud);
        let attempts = connector.attempts();
        assert_eq!(connector.attempt_modes(), vec![Local, Cloud]);
        assert_eq!(
            (attempts[1].at - attempts[0].at).as_secs(),
            ctx.settings.local_connect_timeout.as_secs()
        );
        assert!(ctx.state.borrow().fallback_active);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_cloud_attempt_times_out_into_local() {
        let ctx = context(quick_settings());
        let connector = MockConnector::new();
        connector.always(Cloud, Outcome::Hang).always(Local, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::CloudWithLocalFallback).await;

        assert_eq!(first.unwrap(), ConnectionStatus::Local);
        let attempts = connector.attempts();
        assert_eq!(connector.attempt_modes(), vec![Cloud, Local]);
        assert_eq!(
            (attempts[1].at - attempts[0].at).as_secs(),
            ctx.settings.cloud_connect_timeout.as_secs()
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_publish_times_out_once() {
        let ctx = context(quick_settings());
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Succeed);

        let (handle, _) = start(&ctx, &connector, ConnectionPolicy::LocalOnly).await;
        let link = connector.last_link().unwrap();
        link.set_publish_outcome(PublishOutcome::Hang);
        let calls_before = link.publish_calls();

        let started = tokio::time::Instant::now();
        let result = ctx
            .send_command(&CommandRequest::new().set_switch("fpwr", true))
            .await;

        assert!(matches!(result, Err(CommandError::Timeout(5000))));
        assert_eq!(started.elapsed().as_secs(), ctx.settings.local_command_timeout.as_secs());
        assert_eq!(link.publish_calls() - calls_before, 1);
        assert_eq!(ctx.connection_status(), ConnectionStatus::Local);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cloud_publish_uses_cloud_timeout() {
        let ctx = context(quick_settings());
        let connector = MockConnector::new();
        connector.always(Cloud, Outcome::Succeed);

        let (handle, _) = start(&ctx, &connector, ConnectionPolicy::CloudOnly).await;
        let link = connector.last_link().unwrap();
        link.set_publish_outcome(PublishOutcome::Hang);

        let started = tokio::time::Instant::now();
        let result = ctx
            .send_command(&CommandRequest::new().set_switch("fpwr", true))
            .await;

        assert!(matches!(result, Err(CommandError::Timeout(15000))));
        assert_eq!(started.elapsed().as_secs(), ctx.settings.cloud_command_timeout.as_secs());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publish_is_reported_without_retry() {
        let ctx = context(quick_settings());
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Succeed);

        let (handle, _) = start(&ctx, &connector, ConnectionPolicy::LocalOnly).await;
        let link = connector.last_link().unwrap();
        link.set_publish_outcome(PublishOutcome::Fail);
        let calls_before = link.publish_calls();

        let result = ctx
            .send_command(&CommandRequest::new().set_switch("fpwr", true))
            .await;

        assert!(matches!(result, Err(CommandError::Publish(_))));
        assert_eq!(link.publish_calls() - calls_before, 1);
        assert!(!link.published_msgs().contains(&"STATE-SET".to_string()));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_retry_interval_keeps_fallback_running() {
        let ctx = context(quick_settings().with_preferred_retry_interval(Duration::MAX));
        let connector = MockConnector::new();
        connector.always(Local, Outcome::Fail).always(Cloud, Outcome::Succeed);

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalWithCloudFallback).await;

        assert_eq!(first.unwrap(), ConnectionStatus::Cloud);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(handle.is_running());
        assert_eq!(connector.attempt_modes(), vec![Local, Cloud]);
        assert_eq!(ctx.connection_status(), ConnectionStatus::Cloud);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_reconnect_delay_keeps_engine_alive() {
        let settings =
            quick_settings().with_reconnect(BackoffPolicy::new(Duration::MAX, Duration::MAX));
        let ctx = context(settings);
        let connector = MockConnector::new();

        let (handle, first) = start(&ctx, &connector, ConnectionPolicy::LocalOnly).await;

        assert!(matches!(first, Err(Error::Transport(_))));
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(handle.is_running());
        assert_eq!(connector.attempt_modes(), vec![Local]);

        handle.shutdown().await;
    }
}
