//! Client-level statistics.

use ordercast_core::{ConnectionState, TransportKind};
use ordercast_pipeline::PipelineStats;
use serde::Serialize;

/// Transport-facing counters, reset on explicit disconnect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportStats {
    /// Frames sent, including handshake and probe events.
    pub messages_sent: u64,
    /// Named server events received.
    pub messages_received: u64,
    /// Reconnection attempts reported by the transport.
    pub reconnect_attempts: u64,
    /// Last measured round trip.
    pub latency_ms: Option<u64>,
    /// Transport carrying the session.
    pub transport_kind: TransportKind,
}

/// Supervisor state plus transport counters, as owned by the actor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct SupervisorSnapshot {
    pub(crate) state: ConnectionState,
    pub(crate) tenant_id: Option<String>,
    pub(crate) transport_id: Option<String>,
    pub(crate) transport: TransportStats,
}

/// Everything [`stats`](crate::RealtimeClient::stats) reports.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    /// Current connection state.
    pub state: ConnectionState,
    /// Tenant of the current session.
    pub tenant_id: Option<String>,
    /// Server-assigned id of the live transport.
    pub transport_id: Option<String>,
    /// Transport counters.
    pub transport: TransportStats,
    /// Notification counters.
    pub pipeline: PipelineStats,
}

impl ClientStats {
    pub(crate) fn new(snapshot: SupervisorSnapshot, pipeline: PipelineStats) -> Self {
        Self {
            state: snapshot.state,
            tenant_id: snapshot.tenant_id,
            transport_id: snapshot.transport_id,
            transport: snapshot.transport,
            pipeline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let stats = ClientStats::new(SupervisorSnapshot::default(), PipelineStats::default());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["state"], "DISCONNECTED");
        assert_eq!(json["transport"]["transportKind"], "none");
        assert_eq!(json["transport"]["messagesSent"], 0);
        assert_eq!(json["pipeline"]["totalReceived"], 0);
    }
}
