//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it overrides.

use std::time::Duration;

use ordercast_core::TransportKind;
use ordercast_core::constants::DEFAULT_PLATFORM;
use ordercast_core::retry::Backoff;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the realtime client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Server endpoint and handshake identity.
    pub server: ServerSettings,
    /// Connect, authentication, and reconnection timing.
    pub connection: ConnectionSettings,
    /// Liveness watchdog timing.
    pub heartbeat: HeartbeatSettings,
    /// Notification queue capacities.
    pub pipeline: PipelineSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ClientSettings {
    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.url is empty".into()));
        }
        if self.server.transports.is_empty() {
            return Err(SettingsError::InvalidValue(
                "server.transports lists no transport".into(),
            ));
        }
        if self.heartbeat.interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "heartbeat.intervalMs must be positive".into(),
            ));
        }
        if self.heartbeat.timeout_ms < self.heartbeat.interval_ms {
            return Err(SettingsError::InvalidValue(format!(
                "heartbeat.timeoutMs ({}) is shorter than heartbeat.intervalMs ({})",
                self.heartbeat.timeout_ms, self.heartbeat.interval_ms
            )));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.connectTimeoutMs must be positive".into(),
            ));
        }
        let p = &self.pipeline;
        if p.pending_capacity == 0 || p.processed_capacity == 0 || p.failed_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "pipeline capacities must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.connection.randomization_factor) {
            return Err(SettingsError::InvalidValue(
                "connection.randomizationFactor must be within 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }
}

/// Server endpoint settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Base URL of the realtime server (`ws://`, `wss://`, `http://`, `https://`).
    pub url: String,
    /// Socket.IO namespace.
    pub namespace: String,
    /// Platform tag sent with `authenticate`.
    pub platform: String,
    /// Transports in order of preference.
    pub transports: Vec<TransportKind>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000".to_string(),
            namespace: "/".to_string(),
            platform: DEFAULT_PLATFORM.to_string(),
            transports: vec![TransportKind::Websocket, TransportKind::Polling],
        }
    }
}

/// Connect, authentication, and reconnection timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// How long `connect` waits for the transport before failing.
    pub connect_timeout_ms: u64,
    /// Delay between transport connect and sending `authenticate`.
    pub auth_settle_ms: u64,
    /// Delay between teardown and the new connect in a manual reconnect.
    pub reconnect_settle_ms: u64,
    /// Transport reconnection attempts before giving up.
    pub reconnection_attempts: u32,
    /// First reconnection delay.
    pub reconnection_delay_ms: u64,
    /// Reconnection delay cap.
    pub reconnection_delay_max_ms: u64,
    /// Reconnection jitter factor 0.0–1.0.
    pub randomization_factor: f64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 30_000,
            auth_settle_ms: 500,
            reconnect_settle_ms: 1000,
            reconnection_attempts: 5,
            reconnection_delay_ms: 1000,
            reconnection_delay_max_ms: 5000,
            randomization_factor: 0.5,
        }
    }
}

impl ConnectionSettings {
    /// Connect deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Delay before `authenticate`.
    pub fn auth_settle(&self) -> Duration {
        Duration::from_millis(self.auth_settle_ms)
    }

    /// Delay inside a manual reconnect.
    pub fn reconnect_settle(&self) -> Duration {
        Duration::from_millis(self.reconnect_settle_ms)
    }

    /// Transport reconnection policy.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_attempts: self.reconnection_attempts,
            base_delay: Duration::from_millis(self.reconnection_delay_ms),
            max_delay: Duration::from_millis(self.reconnection_delay_max_ms),
            randomization_factor: self.randomization_factor,
        }
    }
}

/// Liveness watchdog timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatSettings {
    /// How often the watchdog checks staleness.
    pub interval_ms: u64,
    /// Staleness that triggers a probe (1.5× the interval by default).
    pub timeout_ms: u64,
    /// How long a probe may go unanswered before a forced reconnect.
    pub probe_grace_ms: u64,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            timeout_ms: 45_000,
            probe_grace_ms: 5000,
        }
    }
}

impl HeartbeatSettings {
    /// Check interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Staleness threshold.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Probe grace window.
    pub fn probe_grace(&self) -> Duration {
        Duration::from_millis(self.probe_grace_ms)
    }
}

/// Notification queue capacities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineSettings {
    /// Pending queue bound (oldest evicted).
    pub pending_capacity: usize,
    /// Processed history bound (most recent kept).
    pub processed_capacity: usize,
    /// Failed history bound (oldest evicted).
    pub failed_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pending_capacity: 100,
            processed_capacity: 100,
            failed_capacity: 50,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = ClientSettings::default();
        assert_eq!(s.server.platform, "pos");
        assert_eq!(
            s.server.transports,
            vec![TransportKind::Websocket, TransportKind::Polling]
        );
        assert_eq!(s.connection.connect_timeout_ms, 30_000);
        assert_eq!(s.heartbeat.interval_ms, 30_000);
        assert_eq!(s.heartbeat.probe_grace_ms, 5000);
        assert_eq!(s.pipeline.pending_capacity, 100);
        assert_eq!(s.pipeline.processed_capacity, 100);
        assert_eq!(s.pipeline.failed_capacity, 50);
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn default_timeout_is_one_and_a_half_intervals() {
        let hb = HeartbeatSettings::default();
        assert_eq!(hb.timeout_ms * 2, hb.interval_ms * 3);
    }

    #[test]
    fn defaults_validate() {
        ClientSettings::default().validate().unwrap();
    }

    #[test]
    fn timeout_shorter_than_interval_rejected() {
        let mut s = ClientSettings::default();
        s.heartbeat.timeout_ms = 10_000;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("timeoutMs"));
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut s = ClientSettings::default();
        s.pipeline.failed_capacity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn empty_url_rejected() {
        let mut s = ClientSettings::default();
        s.server.url = "  ".into();
        assert!(s.validate().is_err());
    }

    #[test]
    fn jitter_out_of_range_rejected() {
        let mut s = ClientSettings::default();
        s.connection.randomization_factor = 1.5;
        assert!(s.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: ClientSettings =
            serde_json::from_str(r#"{"heartbeat": {"intervalMs": 10000}}"#).unwrap();
        assert_eq!(s.heartbeat.interval_ms, 10_000);
        assert_eq!(s.heartbeat.timeout_ms, 45_000);
        assert_eq!(s.server.platform, "pos");
    }

    #[test]
    fn backoff_from_connection_settings() {
        let c = ConnectionSettings::default();
        let b = c.backoff();
        assert_eq!(b.max_attempts, 5);
        assert_eq!(b.base_delay, Duration::from_secs(1));
        assert_eq!(b.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(ClientSettings::default()).unwrap();
        assert!(json["connection"]["connectTimeoutMs"].is_u64());
        assert!(json["heartbeat"]["probeGraceMs"].is_u64());
        assert!(json["pipeline"]["pendingCapacity"].is_u64());
    }
}
