//! Host application lifecycle and network reachability bridge.
//!
//! Backgrounding pauses the watchdog. Coming back to the foreground resumes
//! it and reconnects when a session exists but the transport is down.
//! Regaining the network after a loss reconnects the same way.

use ordercast_core::ConnectionState;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::client::RealtimeClient;

/// Host application visibility.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AppState {
    /// Foreground and interactive.
    #[default]
    Active,
    /// Foreground but not receiving input (transitional).
    Inactive,
    /// Not visible.
    Background,
}

#[derive(Debug)]
struct BridgeState {
    app: AppState,
    network_available: bool,
}

/// What the bridge did in response to a host event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Nothing to do.
    None,
    /// Watchdog paused.
    PausedWatchdog,
    /// Watchdog resumed, connection left alone.
    ResumedWatchdog,
    /// Reconnect requested.
    Reconnected,
}

/// Turns host lifecycle events into supervisor commands.
pub struct LifecycleBridge {
    client: RealtimeClient,
    state: Mutex<BridgeState>,
}

impl LifecycleBridge {
    /// Bridge for `client`, assuming an active app with network.
    pub fn new(client: RealtimeClient) -> Self {
        Self {
            client,
            state: Mutex::new(BridgeState {
                app: AppState::Active,
                network_available: true,
            }),
        }
    }

    /// Last app state seen.
    pub fn app_state(&self) -> AppState {
        self.state.lock().app
    }

    /// Last reachability seen.
    pub fn network_available(&self) -> bool {
        self.state.lock().network_available
    }

    /// The host app changed visibility.
    pub async fn on_app_state_change(&self, next: AppState) -> LifecycleAction {
        let previous = std::mem::replace(&mut self.state.lock().app, next);
        if previous == next {
            return LifecycleAction::None;
        }
        debug!(?previous, ?next, "app state changed");

        match next {
            AppState::Background => {
                self.client.pause_watchdog().await;
                LifecycleAction::PausedWatchdog
            }
            AppState::Active => {
                self.client.resume_watchdog().await;
                if self.should_reconnect(false).await {
                    info!("foregrounded with transport down, reconnecting");
                    self.client.request_reconnect().await;
                    LifecycleAction::Reconnected
                } else {
                    LifecycleAction::ResumedWatchdog
                }
            }
            AppState::Inactive => LifecycleAction::None,
        }
    }

    /// The host's network path changed.
    pub async fn on_network_change(&self, available: bool) -> LifecycleAction {
        let was_available = std::mem::replace(&mut self.state.lock().network_available, available);
        if was_available == available {
            return LifecycleAction::None;
        }
        debug!(available, "network reachability changed");
        if !available {
            return LifecycleAction::None;
        }
        if self.should_reconnect(true).await {
            info!("network restored, reconnecting");
            self.client.request_reconnect().await;
            return LifecycleAction::Reconnected;
        }
        LifecycleAction::None
    }

    /// A session exists and the transport is down. A transport still
    /// retrying on its own counts as down only when `include_retrying`.
    async fn should_reconnect(&self, include_retrying: bool) -> bool {
        let state = self.client.status();
        let down = match state {
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Error => true,
            ConnectionState::Reconnecting => include_retrying,
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Authenticated => false,
        };
        down && self.client.tenant_id().await.is_some()
    }
}
