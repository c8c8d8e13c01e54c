//! Shared harness for client scenario tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ordercast_client::test_utils::RecordingConnector;
use ordercast_client::{ClientRuntime, RealtimeClient, StatusListener};
use ordercast_core::{ConnectionState, CredentialProvider, StaticCredential};
use ordercast_settings::ClientSettings;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub const TOKEN: &str = "secret-token";

/// Records every state a status listener sees.
#[derive(Default)]
pub struct StatusLog(Mutex<Vec<ConnectionState>>);

impl StatusLog {
    pub fn states(&self) -> Vec<ConnectionState> {
        self.0.lock().clone()
    }
}

impl StatusListener for StatusLog {
    fn on_status(&self, state: ConnectionState) {
        self.0.lock().push(state);
    }
}

pub struct Harness {
    pub client: RealtimeClient,
    pub runtime: ClientRuntime,
    pub connector: RecordingConnector,
    pub statuses: Arc<StatusLog>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_credentials(Arc::new(StaticCredential::new(TOKEN)))
    }

    pub fn with_credentials(credentials: Arc<dyn CredentialProvider>) -> Self {
        let connector = RecordingConnector::new();
        let (client, runtime) = RealtimeClient::builder(ClientSettings::default(), credentials)
            .connector(Arc::new(connector.clone()))
            .spawn();
        let statuses = Arc::new(StatusLog::default());
        let _ = client.on_status_change(statuses.clone());
        Self {
            client,
            runtime,
            connector,
            statuses,
        }
    }

    /// Start `connect` in the background.
    pub fn start_connect(&self, tenant_id: &str) -> JoinHandle<ordercast_core::Result<()>> {
        let client = self.client.clone();
        let tenant_id = tenant_id.to_string();
        tokio::spawn(async move { client.connect(&tenant_id).await })
    }

    /// Connect and let the transport report connected.
    pub async fn connect(&self, tenant_id: &str) {
        let pending = self.start_connect(tenant_id);
        settle().await;
        assert!(self.connector.accept());
        pending.await.unwrap().unwrap();
    }

    /// Connect, wait for `authenticate`, and answer it.
    pub async fn authenticate(&self, tenant_id: &str) {
        self.connect(tenant_id).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(
            self.connector
                .server_event("authenticated", serde_json::json!({ "tenantId": tenant_id }))
        );
        settle().await;
        assert_eq!(self.client.status(), ConnectionState::Authenticated);
    }
}

/// Let the supervisor drain its inputs.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
