//! Liveness bookkeeping shared between the supervisor and the watchdog.
//!
//! The supervisor writes through the crate-private mutators on every inbound
//! frame; everyone else only gets snapshots.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;

/// Timestamps of the most recent liveness signals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthSample {
    /// Last inbound frame of any kind.
    pub last_activity_at: Option<Instant>,
    /// Last transport-level ping from the server.
    pub last_ping_at: Option<Instant>,
    /// Last pong (transport-level or answer to our probe).
    pub last_pong_at: Option<Instant>,
    /// Last time a transport connected.
    pub last_connected_at: Option<Instant>,
}

impl HealthSample {
    /// Most recent of activity, pong, and connect.
    pub fn last_signal(&self) -> Option<Instant> {
        [self.last_activity_at, self.last_pong_at, self.last_connected_at]
            .into_iter()
            .flatten()
            .max()
    }

    /// Time since the most recent signal, or `None` if nothing was ever
    /// recorded.
    pub fn staleness(&self, now: Instant) -> Option<Duration> {
        self.last_signal().map(|at| now.saturating_duration_since(at))
    }
}

/// Shared, read-mostly handle to the current [`HealthSample`].
#[derive(Clone, Debug, Default)]
pub struct HealthMonitor {
    sample: Arc<RwLock<HealthSample>>,
}

impl HealthMonitor {
    /// Fresh monitor with nothing recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current sample.
    pub fn snapshot(&self) -> HealthSample {
        *self.sample.read()
    }

    /// A transport connected: forget everything older.
    pub(crate) fn reset(&self, now: Instant) {
        *self.sample.write() = HealthSample {
            last_activity_at: Some(now),
            last_ping_at: None,
            last_pong_at: None,
            last_connected_at: Some(now),
        };
    }

    pub(crate) fn record_activity(&self, now: Instant) {
        self.sample.write().last_activity_at = Some(now);
    }

    pub(crate) fn record_ping(&self, now: Instant) {
        let mut sample = self.sample.write();
        sample.last_ping_at = Some(now);
        sample.last_activity_at = Some(now);
    }

    pub(crate) fn record_pong(&self, now: Instant) {
        let mut sample = self.sample.write();
        sample.last_pong_at = Some(now);
        sample.last_activity_at = Some(now);
    }
}
