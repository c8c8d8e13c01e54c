//! Connection supervisor actor.
//!
//! One task owns the session, the transport handle, the health sample writes,
//! and the transport counters. It is driven by four inputs:
//!
//! - [`Command`]s from [`RealtimeClient`](crate::RealtimeClient) handles
//! - transport events, tagged with the generation of the transport that
//!   produced them
//! - its own timers (auth settle, connect deadline, reconnect settle)
//! - watchdog signals, tagged with the watchdog run that raised them
//!
//! Teardown bumps the generation, so anything a closed transport or an
//! expired timer reports afterwards is ignored.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ordercast_core::retry::Backoff;
use ordercast_core::wire::{self, AUTHENTICATE, JOIN_LEGACY, JOIN_ROOM, PING};
use ordercast_core::{
    AuthError, ClientError, ConnectionError, ConnectionState, Credential, CredentialProvider,
    DisconnectReason, TransportError, TransportKind,
};
use ordercast_pipeline::NotificationPipeline;
use ordercast_settings::ClientSettings;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::health::HealthMonitor;
use crate::listeners::Listeners;
use crate::stats::{SupervisorSnapshot, TransportStats};
use crate::transport::{
    ConnectRequest, Connector, Envelope, EventSink, TransportEvent, TransportHandle,
};
use crate::watchdog::{WatchdogAction, WatchdogConfig, WatchdogSignal, run_watchdog};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

/// Requests from client handles.
pub(crate) enum Command {
    Connect {
        tenant_id: String,
        reply: Reply<()>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Reconnect {
        reply: Option<Reply<()>>,
    },
    Emit {
        event: String,
        payload: Value,
        ack: Option<oneshot::Sender<Value>>,
        reply: oneshot::Sender<Result<(), TransportError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SupervisorSnapshot>,
    },
    PauseWatchdog,
    ResumeWatchdog,
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Supervisor timing and endpoint, resolved from [`ClientSettings`].
#[derive(Clone, Debug)]
pub(crate) struct SupervisorConfig {
    pub(crate) url: String,
    pub(crate) namespace: String,
    pub(crate) platform: String,
    pub(crate) transports: Vec<TransportKind>,
    pub(crate) backoff: Backoff,
    pub(crate) connect_timeout: Duration,
    pub(crate) auth_settle: Duration,
    pub(crate) reconnect_settle: Duration,
    pub(crate) watchdog: WatchdogConfig,
}

impl SupervisorConfig {
    pub(crate) fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            url: settings.server.url.clone(),
            namespace: settings.server.namespace.clone(),
            platform: settings.server.platform.clone(),
            transports: settings.server.transports.clone(),
            backoff: settings.connection.backoff(),
            connect_timeout: settings.connection.connect_timeout(),
            auth_settle: settings.connection.auth_settle(),
            reconnect_settle: settings.connection.reconnect_settle(),
            watchdog: WatchdogConfig {
                interval: settings.heartbeat.interval(),
                timeout: settings.heartbeat.timeout(),
                probe_grace: settings.heartbeat.probe_grace(),
            },
        }
    }
}

#[derive(Debug)]
enum Timer {
    AuthSettle { epoch: u64 },
    ConnectDeadline { generation: u64 },
    ReconnectSettle { generation: u64 },
}

struct Session {
    tenant_id: String,
    credential: Credential,
    transport_id: Option<String>,
}

struct ActiveTransport {
    generation: u64,
    handle: Box<dyn TransportHandle>,
}

enum PendingAck {
    Caller(oneshot::Sender<Value>),
    JoinRoom { tenant_id: String },
}

struct WatchdogRun {
    run: u64,
    cancel: CancellationToken,
}

/// Shared collaborators handed to the actor at spawn time.
pub(crate) struct Collaborators {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) pipeline: Arc<NotificationPipeline>,
    pub(crate) listeners: Arc<Listeners>,
    pub(crate) health: HealthMonitor,
    pub(crate) status: watch::Sender<ConnectionState>,
}

pub(crate) struct Supervisor {
    config: SupervisorConfig,
    connector: Arc<dyn Connector>,
    credentials: Arc<dyn CredentialProvider>,
    pipeline: Arc<NotificationPipeline>,
    listeners: Arc<Listeners>,
    health: HealthMonitor,
    status: watch::Sender<ConnectionState>,

    session: Option<Session>,
    transport: Option<ActiveTransport>,
    generation: u64,
    /// Bumped on every transport connect and loss; stamps auth-settle timers.
    auth_epoch: u64,
    waiters: Vec<Reply<()>>,
    acks: HashMap<u64, PendingAck>,
    next_ack_id: u64,
    stats: TransportStats,
    probe_sent_at: Option<Instant>,

    watchdog: Option<WatchdogRun>,
    watchdog_runs: u64,
    watchdog_paused: bool,

    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    timers_tx: mpsc::UnboundedSender<Timer>,
    timers_rx: mpsc::UnboundedReceiver<Timer>,
    signals_tx: mpsc::UnboundedSender<WatchdogSignal>,
    signals_rx: mpsc::UnboundedReceiver<WatchdogSignal>,
}

impl Supervisor {
    pub(crate) fn new(
        config: SupervisorConfig,
        collaborators: Collaborators,
        commands: mpsc::Receiver<Command>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (timers_tx, timers_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();
        Self {
            config,
            connector: collaborators.connector,
            credentials: collaborators.credentials,
            pipeline: collaborators.pipeline,
            listeners: collaborators.listeners,
            health: collaborators.health,
            status: collaborators.status,
            session: None,
            transport: None,
            generation: 0,
            auth_epoch: 0,
            waiters: Vec::new(),
            acks: HashMap::new(),
            next_ack_id: 0,
            stats: TransportStats::default(),
            probe_sent_at: None,
            watchdog: None,
            watchdog_runs: 0,
            watchdog_paused: false,
            commands,
            events_tx,
            events_rx,
            timers_tx,
            timers_rx,
            signals_tx,
            signals_rx,
        }
    }

    /// Run until shut down or every client handle is dropped.
    pub(crate) async fn run(mut self) {
        debug!("supervisor started");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all client handles dropped");
                        self.disconnect();
                        break;
                    };
                    if self.handle_command(cmd).is_break() {
                        break;
                    }
                }
                Some(envelope) = self.events_rx.recv() => self.handle_transport(envelope),
                Some(timer) = self.timers_rx.recv() => self.handle_timer(timer),
                Some(signal) = self.signals_rx.recv() => self.handle_watchdog(signal),
            }
        }
        debug!("supervisor stopped");
    }

    fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    fn tenant(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.tenant_id.as_str())
    }

    /// Move to `next`, suppressing duplicates and refusing transitions the
    /// state machine does not allow.
    fn set_state(&mut self, next: ConnectionState) {
        let current = self.state();
        if current == next {
            return;
        }
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "ignoring illegal state transition");
            return;
        }
        let _ = self.status.send_replace(next);
        info!(
            tenant_id = self.tenant().unwrap_or_default(),
            from = %current,
            to = %next,
            "connection state changed"
        );
        self.listeners.notify_status(next);
    }

    // ── commands ────────────────────────────────────────────────────────

    fn handle_command(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Connect { tenant_id, reply } => self.connect(tenant_id, reply),
            Command::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
            Command::Reconnect { reply } => self.reconnect(reply),
            Command::Emit {
                event,
                payload,
                ack,
                reply,
            } => {
                let _ = reply.send(self.emit(&event, &payload, ack));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::PauseWatchdog => {
                debug!("watchdog paused");
                self.watchdog_paused = true;
                self.stop_watchdog();
            }
            Command::ResumeWatchdog => {
                debug!("watchdog resumed");
                self.watchdog_paused = false;
                if self.state().is_connected() {
                    self.health.reset(Instant::now());
                    self.start_watchdog();
                }
            }
            Command::Shutdown { reply } => {
                self.disconnect();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn connect(&mut self, tenant_id: String, reply: Reply<()>) {
        let state = self.state();
        let same_tenant = self.tenant() == Some(tenant_id.as_str());

        if same_tenant && state.is_connected() {
            debug!(tenant_id, %state, "already connected");
            let _ = reply.send(Ok(()));
            return;
        }
        if same_tenant && state.is_in_flight() {
            debug!(tenant_id, %state, "connect already in flight");
            self.waiters.push(reply);
            return;
        }

        let Some(credential) = self.credentials.credential(&tenant_id) else {
            warn!(tenant_id, "no credential for tenant");
            let _ = reply.send(Err(ConnectionError::MissingCredential { tenant_id }.into()));
            return;
        };

        if self.session.is_some() && !same_tenant {
            info!(
                from = self.tenant().unwrap_or_default(),
                to = tenant_id,
                "switching tenant"
            );
            self.disconnect();
        }

        self.waiters.push(reply);
        self.open(tenant_id, credential);
    }

    /// Start a fresh transport for `tenant_id`.
    fn open(&mut self, tenant_id: String, credential: Credential) {
        if let Some(old) = self.transport.take() {
            old.handle.close();
        }
        self.generation += 1;
        let generation = self.generation;

        self.session = Some(Session {
            tenant_id,
            credential,
            transport_id: None,
        });
        self.set_state(ConnectionState::Connecting);

        let request = ConnectRequest {
            url: self.config.url.clone(),
            namespace: self.config.namespace.clone(),
            transports: self.config.transports.clone(),
            backoff: self.config.backoff,
        };
        let sink = EventSink::new(generation, self.events_tx.clone());
        let handle = self.connector.connect(request, sink);
        self.transport = Some(ActiveTransport { generation, handle });
        self.schedule(
            self.config.connect_timeout,
            Timer::ConnectDeadline { generation },
        );
        info!(
            tenant_id = self.tenant().unwrap_or_default(),
            generation, "opening transport"
        );
    }

    fn disconnect(&mut self) {
        self.teardown(|| ConnectionError::Cancelled.into());
        self.session = None;
        self.stats = TransportStats::default();
        self.set_state(ConnectionState::Disconnected);
    }

    fn reconnect(&mut self, reply: Option<Reply<()>>) {
        let Some(tenant_id) = self.tenant().map(str::to_string) else {
            debug!("reconnect requested without a session");
            if let Some(reply) = reply {
                let _ = reply.send(Err(ConnectionError::NoSession.into()));
            }
            return;
        };
        info!(tenant_id, "reconnecting");
        self.teardown(|| ConnectionError::Cancelled.into());
        self.set_state(ConnectionState::Disconnected);
        if let Some(reply) = reply {
            self.waiters.push(reply);
        }
        self.schedule(
            self.config.reconnect_settle,
            Timer::ReconnectSettle {
                generation: self.generation,
            },
        );
    }

    /// Close the transport and drop everything tied to it. Session and
    /// state are left to the caller.
    fn teardown(&mut self, waiter_error: impl Fn() -> ClientError) {
        self.generation += 1;
        self.auth_epoch += 1;
        if let Some(transport) = self.transport.take() {
            debug!(generation = transport.generation, "closing transport");
            transport.handle.close();
        }
        self.stop_watchdog();
        self.acks.clear();
        self.probe_sent_at = None;
        if let Some(session) = &mut self.session {
            session.transport_id = None;
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(waiter_error()));
        }
    }

    fn emit(
        &mut self,
        event: &str,
        payload: &Value,
        ack: Option<oneshot::Sender<Value>>,
    ) -> Result<(), TransportError> {
        if !self.state().is_connected() {
            return Err(TransportError::NotConnected);
        }
        let ack_id = ack.map(|tx| self.register_ack(PendingAck::Caller(tx)));
        let sent = self.send(event, payload, ack_id);
        if sent.is_err() {
            if let Some(id) = ack_id {
                let _ = self.acks.remove(&id);
            }
        }
        sent
    }

    fn register_ack(&mut self, pending: PendingAck) -> u64 {
        self.next_ack_id += 1;
        let _ = self.acks.insert(self.next_ack_id, pending);
        self.next_ack_id
    }

    fn send(&mut self, event: &str, payload: &Value, ack_id: Option<u64>) -> Result<(), TransportError> {
        let transport = self.transport.as_ref().ok_or(TransportError::NotConnected)?;
        transport.handle.emit(event, payload, ack_id)?;
        self.stats.messages_sent += 1;
        trace!(event, ?ack_id, "frame sent");
        Ok(())
    }

    fn snapshot(&self) -> SupervisorSnapshot {
        SupervisorSnapshot {
            state: self.state(),
            tenant_id: self.tenant().map(str::to_string),
            transport_id: self.session.as_ref().and_then(|s| s.transport_id.clone()),
            transport: self.stats.clone(),
        }
    }

    // ── timers ──────────────────────────────────────────────────────────

    fn schedule(&self, delay: Duration, timer: Timer) {
        let tx = self.timers_tx.clone();
        let _ = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(timer);
        });
    }

    fn handle_timer(&mut self, timer: Timer) {
        match timer {
            Timer::AuthSettle { epoch } => {
                if epoch != self.auth_epoch || self.state() != ConnectionState::Connected {
                    return;
                }
                self.authenticate();
            }
            Timer::ConnectDeadline { generation } => {
                if generation != self.generation || self.state() != ConnectionState::Connecting {
                    return;
                }
                let timeout = self.config.connect_timeout;
                warn!(
                    tenant_id = self.tenant().unwrap_or_default(),
                    timeout_ms = timeout.as_millis(),
                    "connect timed out"
                );
                self.teardown(|| ConnectionError::Timeout { timeout }.into());
                self.set_state(ConnectionState::Error);
            }
            Timer::ReconnectSettle { generation } => {
                if generation != self.generation || self.state().has_transport() {
                    return;
                }
                let Some(tenant_id) = self.tenant().map(str::to_string) else {
                    return;
                };
                match self.credentials.credential(&tenant_id) {
                    Some(credential) => self.open(tenant_id, credential),
                    None => {
                        warn!(tenant_id, "no credential for tenant on reconnect");
                        let id = tenant_id.clone();
                        self.teardown(|| {
                            ConnectionError::MissingCredential {
                                tenant_id: id.clone(),
                            }
                            .into()
                        });
                    }
                }
            }
        }
    }

    fn authenticate(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let payload =
            wire::authenticate_payload(&session.credential, &session.tenant_id, &self.config.platform);
        debug!(tenant_id = session.tenant_id, "sending authenticate");
        if let Err(e) = self.send(AUTHENTICATE, &payload, None) {
            warn!(error = %e, "failed to send authenticate");
        }
    }

    // ── transport events ────────────────────────────────────────────────

    fn handle_transport(&mut self, envelope: Envelope) {
        if envelope.generation != self.generation || self.transport.is_none() {
            trace!(
                generation = envelope.generation,
                current = self.generation,
                "ignoring event from superseded transport"
            );
            return;
        }

        match envelope.event {
            TransportEvent::Connected { transport_id, kind } => {
                self.on_connected(transport_id, kind);
            }
            TransportEvent::ConnectError { message } => {
                if self.state() == ConnectionState::Connecting {
                    warn!(
                        tenant_id = self.tenant().unwrap_or_default(),
                        error = message,
                        "connect failed"
                    );
                    self.teardown(|| ConnectionError::Transport(message.clone()).into());
                    self.set_state(ConnectionState::Error);
                } else {
                    debug!(error = message, "connect error during reconnection");
                }
            }
            TransportEvent::Disconnected { reason } => self.on_disconnected(reason),
            TransportEvent::ReconnectAttempt { attempt } => {
                self.stats.reconnect_attempts += 1;
                debug!(attempt, "transport reconnection attempt");
            }
            TransportEvent::ReconnectFailed => {
                warn!(
                    tenant_id = self.tenant().unwrap_or_default(),
                    "transport gave up reconnecting"
                );
                self.teardown(|| {
                    ConnectionError::Transport("reconnection attempts exhausted".into()).into()
                });
                self.set_state(ConnectionState::Failed);
            }
            TransportEvent::Message { event, payload } => self.on_message(&event, &payload),
            TransportEvent::Ack { id, payload } => {
                self.health.record_activity(Instant::now());
                match self.acks.remove(&id) {
                    Some(PendingAck::Caller(tx)) => {
                        let _ = tx.send(payload);
                    }
                    Some(PendingAck::JoinRoom { tenant_id }) => {
                        info!(tenant_id, ack = %payload, "joined tenant room");
                    }
                    None => trace!(id, "ack without pending emit"),
                }
            }
            TransportEvent::Ping => self.health.record_ping(Instant::now()),
            TransportEvent::Pong { latency_ms } => self.on_pong(latency_ms),
        }
    }

    fn on_connected(&mut self, transport_id: String, kind: TransportKind) {
        self.health.reset(Instant::now());
        self.stats.transport_kind = kind;
        if let Some(session) = &mut self.session {
            session.transport_id = Some(transport_id.clone());
        }
        info!(transport_id, %kind, generation = self.generation, "transport connected");
        self.set_state(ConnectionState::Connected);

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        self.start_watchdog();
        self.auth_epoch += 1;
        self.schedule(
            self.config.auth_settle,
            Timer::AuthSettle {
                epoch: self.auth_epoch,
            },
        );
    }

    fn on_disconnected(&mut self, reason: DisconnectReason) {
        let state = self.state();
        if !state.is_connected() {
            debug!(%reason, %state, "disconnect reported while not connected");
            return;
        }
        self.stop_watchdog();
        self.acks.clear();
        self.probe_sent_at = None;
        self.auth_epoch += 1;

        if reason.is_transient() {
            info!(%reason, "transport lost, waiting for transport reconnection");
            if let Some(session) = &mut self.session {
                session.transport_id = None;
            }
            self.set_state(ConnectionState::Reconnecting);
        } else {
            info!(%reason, "transport closed");
            let text = reason.to_string();
            self.teardown(|| ConnectionError::Transport(text.clone()).into());
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn on_message(&mut self, event: &str, payload: &Value) {
        self.health.record_activity(Instant::now());
        self.stats.messages_received += 1;
        trace!(event, "server event");

        match event {
            wire::AUTHENTICATED => self.on_authenticated(payload),
            wire::UNAUTHORIZED => self.on_unauthorized(payload),
            wire::PONG => self.on_pong(wire::pong_latency(payload)),
            wire::ORDER_NOTIFICATION => {
                let _ = self.pipeline.process_notification(payload);
            }
            _ => {}
        }
        self.listeners.notify_event(event, payload);
    }

    /// Whether `payload` names a tenant other than the current session's.
    fn is_stale_tenant(&self, payload: &Value) -> bool {
        match (wire::payload_tenant(payload), self.tenant()) {
            (Some(named), Some(current)) => named != current,
            (_, None) => true,
            (None, Some(_)) => false,
        }
    }

    fn on_authenticated(&mut self, payload: &Value) {
        if self.is_stale_tenant(payload) {
            debug!("authenticated for another tenant, ignoring");
            return;
        }
        if self.state() != ConnectionState::Connected {
            debug!(state = %self.state(), "unexpected authenticated");
            return;
        }
        let Some(tenant_id) = self.tenant().map(str::to_string) else {
            return;
        };
        self.set_state(ConnectionState::Authenticated);

        let ack_id = self.register_ack(PendingAck::JoinRoom {
            tenant_id: tenant_id.clone(),
        });
        if let Err(e) = self.send(JOIN_ROOM, &wire::join_room_payload(&tenant_id), Some(ack_id)) {
            warn!(error = %e, "failed to send join-room");
        }
        if let Err(e) = self.send(JOIN_LEGACY, &wire::join_legacy_payload(&tenant_id), None) {
            warn!(error = %e, "failed to send legacy join");
        }
    }

    fn on_unauthorized(&mut self, payload: &Value) {
        if self.is_stale_tenant(payload) {
            debug!("unauthorized for another tenant, ignoring");
            return;
        }
        let reason = wire::unauthorized_reason(payload);
        warn!(
            tenant_id = self.tenant().unwrap_or_default(),
            reason, "authentication rejected"
        );
        self.teardown(|| {
            AuthError::Unauthorized {
                reason: reason.clone(),
            }
            .into()
        });
        self.set_state(ConnectionState::Error);
    }

    fn on_pong(&mut self, latency_ms: Option<u64>) {
        let now = Instant::now();
        self.health.record_pong(now);
        let probe = self.probe_sent_at.take();
        let latency = latency_ms.or_else(|| probe.map(|at| millis(now.duration_since(at))));
        if let Some(ms) = latency {
            trace!(latency_ms = ms, "pong");
            self.stats.latency_ms = Some(ms);
        }
    }

    // ── watchdog ────────────────────────────────────────────────────────

    fn start_watchdog(&mut self) {
        if self.watchdog_paused || self.watchdog.is_some() {
            return;
        }
        self.watchdog_runs += 1;
        let run = self.watchdog_runs;
        let cancel = CancellationToken::new();
        let _ = tokio::spawn(run_watchdog(
            run,
            self.health.clone(),
            self.config.watchdog,
            self.signals_tx.clone(),
            cancel.clone(),
        ));
        self.watchdog = Some(WatchdogRun { run, cancel });
        debug!(run, "watchdog started");
    }

    fn stop_watchdog(&mut self) {
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.cancel.cancel();
            debug!(run = watchdog.run, "watchdog stopped");
        }
    }

    fn handle_watchdog(&mut self, signal: WatchdogSignal) {
        if self.watchdog.as_ref().map(|w| w.run) != Some(signal.run) {
            trace!(run = signal.run, "ignoring signal from stopped watchdog");
            return;
        }
        match signal.action {
            WatchdogAction::Probe => {
                if !self.state().is_connected() {
                    return;
                }
                self.probe_sent_at = Some(Instant::now());
                let payload = wire::ping_payload(Utc::now().timestamp_millis());
                if let Err(e) = self.send(PING, &payload, None) {
                    warn!(error = %e, "failed to send probe");
                }
            }
            WatchdogAction::Reconnect => {
                self.watchdog = None;
                self.reconnect(None);
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
