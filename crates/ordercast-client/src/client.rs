//! Public client handle and its composition.

use std::sync::Arc;

use ordercast_core::{
    ClientError, ConnectionError, ConnectionState, CredentialProvider, Result, TransportError,
};
use ordercast_pipeline::{NotificationPipeline, QueueCapacities};
use ordercast_settings::ClientSettings;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::health::{HealthMonitor, HealthSample};
use crate::listeners::{EventListener, ListenerId, Listeners, StatusListener, deliver_status};
use crate::stats::ClientStats;
use crate::supervisor::{Collaborators, Command, Supervisor, SupervisorConfig};
use crate::transport::{Connector, WsConnector};

const COMMAND_BUFFER: usize = 64;

/// Builds a [`RealtimeClient`] and spawns its supervisor.
pub struct ClientBuilder {
    settings: ClientSettings,
    credentials: Arc<dyn CredentialProvider>,
    connector: Option<Arc<dyn Connector>>,
    pipeline: Option<Arc<NotificationPipeline>>,
}

impl ClientBuilder {
    /// Use `connector` instead of the WebSocket transport.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Feed notifications into an existing pipeline.
    #[must_use]
    pub fn pipeline(mut self, pipeline: Arc<NotificationPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Spawn the supervisor on the current Tokio runtime.
    pub fn spawn(self) -> (RealtimeClient, ClientRuntime) {
        let pipeline = self.pipeline.unwrap_or_else(|| {
            let p = &self.settings.pipeline;
            Arc::new(NotificationPipeline::new(QueueCapacities {
                pending: p.pending_capacity,
                processed: p.processed_capacity,
                failed: p.failed_capacity,
            }))
        });
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WsConnector::new()));

        let (status_tx, status_rx) = watch::channel(ConnectionState::Disconnected);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let listeners = Arc::new(Listeners::default());
        let health = HealthMonitor::new();

        let supervisor = Supervisor::new(
            SupervisorConfig::from_settings(&self.settings),
            Collaborators {
                connector,
                credentials: self.credentials,
                pipeline: Arc::clone(&pipeline),
                listeners: Arc::clone(&listeners),
                health: health.clone(),
                status: status_tx,
            },
            commands_rx,
        );
        let task = tokio::spawn(supervisor.run());

        let client = RealtimeClient {
            commands: commands_tx,
            status: status_rx,
            listeners,
            pipeline,
            health,
        };
        (client, ClientRuntime { task })
    }
}

/// Owns the supervisor task; held by the composition root.
#[derive(Debug)]
pub struct ClientRuntime {
    task: JoinHandle<()>,
}

impl ClientRuntime {
    /// Wait for the supervisor to stop (after
    /// [`RealtimeClient::shutdown`] or once every handle is dropped).
    pub async fn join(self) {
        let _ = self.task.await;
    }

    /// Whether the supervisor has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Cheap, cloneable handle to the realtime client.
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionState>,
    listeners: Arc<Listeners>,
    pipeline: Arc<NotificationPipeline>,
    health: HealthMonitor,
}

impl RealtimeClient {
    /// Start building a client from settings and a credential source.
    pub fn builder(
        settings: ClientSettings,
        credentials: Arc<dyn CredentialProvider>,
    ) -> ClientBuilder {
        ClientBuilder {
            settings,
            credentials,
            connector: None,
            pipeline: None,
        }
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.commands
            .send(cmd)
            .await
            .map_err(|_| ClientError::from(ConnectionError::Closed))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx)).await?;
        rx.await.map_err(|_| ConnectionError::Closed.into())
    }

    // ── lifecycle ───────────────────────────────────────────────────────

    /// Connect to `tenant_id`.
    ///
    /// Resolves once the transport is connected (authentication follows
    /// asynchronously). Connecting to the tenant already connected, or
    /// already being connected, does not open another transport.
    pub async fn connect(&self, tenant_id: &str) -> Result<()> {
        self.request(|reply| Command::Connect {
            tenant_id: tenant_id.to_string(),
            reply,
        })
        .await?
    }

    /// Drop the session and close the transport.
    pub async fn disconnect(&self) {
        let _ = self.request(|reply| Command::Disconnect { reply }).await;
    }

    /// Tear down the transport and connect again to the same tenant.
    pub async fn reconnect(&self) -> Result<()> {
        self.request(|reply| Command::Reconnect { reply: Some(reply) })
            .await?
    }

    /// Ask for a reconnect without waiting for its outcome.
    pub async fn request_reconnect(&self) {
        let _ = self.send(Command::Reconnect { reply: None }).await;
    }

    /// Disconnect and stop the supervisor.
    pub async fn shutdown(&self) {
        let _ = self.request(|reply| Command::Shutdown { reply }).await;
    }

    // ── outbound ────────────────────────────────────────────────────────

    /// Send a named event. Fails without touching the transport when not
    /// connected.
    pub async fn emit(&self, event: &str, payload: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        self.request(|reply| Command::Emit {
            event: event.to_string(),
            payload,
            ack: None,
            reply,
        })
        .await?
        .map_err(Into::into)
    }

    /// Send a named event and receive the server's acknowledgement.
    ///
    /// The receiver errors if the transport is torn down before the ack
    /// arrives.
    pub async fn emit_with_ack(
        &self,
        event: &str,
        payload: Value,
    ) -> Result<oneshot::Receiver<Value>> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected.into());
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.request(|reply| Command::Emit {
            event: event.to_string(),
            payload,
            ack: Some(ack_tx),
            reply,
        })
        .await??;
        Ok(ack_rx)
    }

    // ── subscriptions ───────────────────────────────────────────────────

    /// Listen for a named server event.
    pub fn on(&self, event: &str, listener: Arc<dyn EventListener>) -> ListenerId {
        self.listeners.add_event(event, listener)
    }

    /// Remove a listener added with [`on`](Self::on) or
    /// [`on_status_change`](Self::on_status_change).
    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Listen for state changes; `listener` is called right away with the
    /// current state.
    pub fn on_status_change(&self, listener: Arc<dyn StatusListener>) -> ListenerId {
        let id = self.listeners.add_status(Arc::clone(&listener));
        deliver_status(listener.as_ref(), self.status());
        id
    }

    /// Receiver that observes every state change.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.status.clone()
    }

    // ── queries ─────────────────────────────────────────────────────────

    /// Current state.
    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Whether `emit` can reach the server.
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Transport and pipeline counters.
    pub async fn stats(&self) -> Result<ClientStats> {
        let snapshot = self.request(|reply| Command::Snapshot { reply }).await?;
        Ok(ClientStats::new(snapshot, self.pipeline.stats()))
    }

    /// Tenant of the current session, kept across reconnects.
    pub async fn tenant_id(&self) -> Option<String> {
        self.request(|reply| Command::Snapshot { reply })
            .await
            .ok()
            .and_then(|s| s.tenant_id)
    }

    /// Latest liveness sample.
    pub fn health(&self) -> HealthSample {
        self.health.snapshot()
    }

    /// The notification pipeline fed by this client.
    pub fn pipeline(&self) -> &Arc<NotificationPipeline> {
        &self.pipeline
    }

    // ── watchdog ────────────────────────────────────────────────────────

    /// Suspend the health watchdog (host app in background).
    pub async fn pause_watchdog(&self) {
        let _ = self.send(Command::PauseWatchdog).await;
    }

    /// Resume the watchdog with a fresh health sample.
    pub async fn resume_watchdog(&self) {
        let _ = self.send(Command::ResumeWatchdog).await;
    }
}
