//! Event names and payload shapes exchanged with the realtime server.

use std::fmt;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::credential::Credential;

// ─────────────────────────────────────────────────────────────────────────────
// Event names
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound: present the credential for a tenant.
pub const AUTHENTICATE: &str = "authenticate";
/// Outbound: join the tenant's broadcast room (acknowledged).
pub const JOIN_ROOM: &str = "join-room";
/// Outbound: secondary join using the legacy room-naming convention.
pub const JOIN_LEGACY: &str = "join";
/// Outbound: manual liveness probe.
pub const PING: &str = "ping";

/// Inbound: credential accepted.
pub const AUTHENTICATED: &str = "authenticated";
/// Inbound: credential refused.
pub const UNAUTHORIZED: &str = "unauthorized";
/// Inbound: order/table/payment state change.
pub const ORDER_NOTIFICATION: &str = "order-notification";
/// Inbound: table lifecycle change.
pub const TABLE_UPDATE: &str = "table-update";
/// Inbound: kitchen marked a dish ready.
pub const DISH_READY: &str = "dish-ready";
/// Inbound: a debt validation needs a decision.
pub const VALIDATION_REQUIRED: &str = "validation-required";
/// Inbound: message for every client of the tenant.
pub const TENANT_BROADCAST: &str = "tenant-broadcast";
/// Inbound: answer to a manual probe.
pub const PONG: &str = "pong";

/// Legacy room name for a tenant.
#[must_use]
pub fn legacy_room(tenant_id: &str) -> String {
    format!("tenant:{tenant_id}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Payload builders
// ─────────────────────────────────────────────────────────────────────────────

/// `authenticate{credential, tenantId, platform}`.
#[must_use]
pub fn authenticate_payload(credential: &Credential, tenant_id: &str, platform: &str) -> Value {
    json!({
        "token": credential.secret().expose_secret(),
        "tenantId": tenant_id,
        "platform": platform,
    })
}

/// `join-room{tenantId}`.
#[must_use]
pub fn join_room_payload(tenant_id: &str) -> Value {
    json!({ "tenantId": tenant_id })
}

/// Legacy `join{room}`.
#[must_use]
pub fn join_legacy_payload(tenant_id: &str) -> Value {
    json!({ "room": legacy_room(tenant_id) })
}

/// `ping{timestamp}` with the send time in epoch milliseconds.
#[must_use]
pub fn ping_payload(sent_at_ms: i64) -> Value {
    json!({ "timestamp": sent_at_ms })
}

/// Tenant named in an `authenticated`/`unauthorized` payload, if any.
#[must_use]
pub fn payload_tenant(payload: &Value) -> Option<&str> {
    payload.get("tenantId").and_then(Value::as_str)
}

/// Reason named in an `unauthorized` payload.
#[must_use]
pub fn unauthorized_reason(payload: &Value) -> String {
    payload
        .get("reason")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unauthorized")
        .to_string()
}

/// Latency reported in a `pong` payload.
#[must_use]
pub fn pong_latency(payload: &Value) -> Option<u64> {
    payload.get("latencyMs").and_then(Value::as_u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Which underlying transport carries the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Not connected.
    #[default]
    None,
    /// Native WebSocket.
    Websocket,
    /// HTTP long-polling fallback.
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Websocket => f.write_str("websocket"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

/// Why a transport closed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the namespace on purpose.
    ServerDisconnect,
    /// This client closed the transport.
    ClientDisconnect,
    /// The socket closed underneath us.
    TransportClose,
    /// The socket errored.
    TransportError,
    /// The server stopped answering pings.
    PingTimeout,
    /// The peer sent an undecodable frame.
    ParseError,
    /// Anything else, verbatim.
    Other(String),
}

impl DisconnectReason {
    /// Classify a reason string in the Socket.IO vocabulary.
    #[must_use]
    pub fn parse(reason: &str) -> Self {
        match reason {
            "io server disconnect" => Self::ServerDisconnect,
            "io client disconnect" => Self::ClientDisconnect,
            "transport close" => Self::TransportClose,
            "transport error" => Self::TransportError,
            "ping timeout" => Self::PingTimeout,
            "parse error" => Self::ParseError,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the transport retries this loss by itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportClose | Self::TransportError | Self::PingTimeout | Self::ParseError
        )
    }

    /// Socket.IO string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerDisconnect => "io server disconnect",
            Self::ClientDisconnect => "io client disconnect",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::PingTimeout => "ping timeout",
            Self::ParseError => "parse error",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_carries_credential_and_tenant() {
        let cred = Credential::new("secret-token");
        let payload = authenticate_payload(&cred, "tenantA", "pos");
        assert_eq!(payload["token"], "secret-token");
        assert_eq!(payload["tenantId"], "tenantA");
        assert_eq!(payload["platform"], "pos");
    }

    #[test]
    fn join_payloads() {
        assert_eq!(join_room_payload("tenantA")["tenantId"], "tenantA");
        assert_eq!(join_legacy_payload("tenantA")["room"], "tenant:tenantA");
    }

    #[test]
    fn unauthorized_reason_fallbacks() {
        assert_eq!(unauthorized_reason(&json!({"reason": "expired"})), "expired");
        assert_eq!(unauthorized_reason(&json!({"message": "bad token"})), "bad token");
        assert_eq!(unauthorized_reason(&json!({})), "unauthorized");
    }

    #[test]
    fn pong_latency_optional() {
        assert_eq!(pong_latency(&json!({"latencyMs": 12})), Some(12));
        assert_eq!(pong_latency(&json!({})), None);
    }

    #[test]
    fn transient_reasons() {
        assert!(DisconnectReason::parse("transport close").is_transient());
        assert!(DisconnectReason::parse("ping timeout").is_transient());
        assert!(DisconnectReason::parse("transport error").is_transient());
        assert!(!DisconnectReason::parse("io server disconnect").is_transient());
        assert!(!DisconnectReason::parse("io client disconnect").is_transient());
        assert!(!DisconnectReason::parse("something else").is_transient());
    }

    #[test]
    fn reason_round_trips() {
        for raw in [
            "io server disconnect",
            "io client disconnect",
            "transport close",
            "transport error",
            "ping timeout",
            "parse error",
            "custom",
        ] {
            assert_eq!(DisconnectReason::parse(raw).as_str(), raw);
        }
    }

    #[test]
    fn transport_kind_serde() {
        assert_eq!(
            serde_json::to_string(&TransportKind::Websocket).unwrap(),
            "\"websocket\""
        );
        assert_eq!(TransportKind::Polling.to_string(), "polling");
    }
}
