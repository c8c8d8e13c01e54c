//! # ordercast-client
//!
//! Realtime connection to the ordercast server for a POS terminal.
//!
//! - **Supervisor**: one actor task owns the session and the transport, and
//!   drives the [`ConnectionState`](ordercast_core::ConnectionState) machine
//! - **Transport**: Socket.IO over WebSocket behind the [`Connector`] seam
//! - **Watchdog**: probes a stale connection and forces a reconnect when the
//!   probe goes unanswered
//! - **Lifecycle**: [`LifecycleBridge`] maps host foreground/background and
//!   reachability changes onto the client
//!
//! [`RealtimeClient`] is the handle applications hold. Inbound
//! `order-notification` events are fed into an
//! [`ordercast_pipeline::NotificationPipeline`].

#![deny(unsafe_code)]

pub mod client;
pub mod health;
pub mod lifecycle;
pub mod listeners;
pub mod stats;
mod supervisor;
pub mod test_utils;
pub mod transport;
pub mod watchdog;

pub use client::{ClientBuilder, ClientRuntime, RealtimeClient};
pub use health::{HealthMonitor, HealthSample};
pub use lifecycle::{AppState, LifecycleAction, LifecycleBridge};
pub use listeners::{EventListener, ListenerId, StatusListener};
pub use stats::{ClientStats, TransportStats};
pub use transport::{
    ConnectRequest, Connector, EventSink, TransportEvent, TransportHandle, WsConnector,
};
pub use watchdog::{WatchdogAction, WatchdogConfig, WatchdogOutcome, WatchdogSignal, run_watchdog};
