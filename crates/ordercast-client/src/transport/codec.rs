//! Engine.IO v4 / Socket.IO v4 text framing.
//!
//! Only the text packets the client needs are supported; binary attachments
//! are rejected as protocol errors.

use ordercast_core::TransportError;
use serde::Deserialize;
use serde_json::Value;

/// Engine.IO pong, sent in answer to a server ping.
pub const PONG: &str = "3";

/// Handshake parameters from the Engine.IO open packet.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenInfo {
    /// Engine.IO session id.
    pub sid: String,
    /// Server ping period in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// How long the server waits for a pong in milliseconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

/// One decoded text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Engine.IO open.
    Open(OpenInfo),
    /// Engine.IO close.
    Close,
    /// Engine.IO ping.
    Ping,
    /// Engine.IO pong.
    Pong,
    /// Engine.IO noop.
    Noop,
    /// Namespace joined.
    Connect {
        /// Namespace.
        namespace: String,
        /// Socket id inside the namespace.
        sid: Option<String>,
    },
    /// Namespace left by the server.
    Disconnect {
        /// Namespace.
        namespace: String,
    },
    /// Named event.
    Event {
        /// Namespace.
        namespace: String,
        /// Ack id requested by the sender.
        ack_id: Option<u64>,
        /// Event name.
        event: String,
        /// First argument.
        payload: Value,
    },
    /// Acknowledgement of one of our emits.
    Ack {
        /// Namespace.
        namespace: String,
        /// Ack id we sent.
        id: u64,
        /// First argument.
        payload: Value,
    },
    /// Namespace join refused.
    ConnectError {
        /// Namespace.
        namespace: String,
        /// Refusal text.
        message: String,
    },
}

fn protocol(msg: impl Into<String>) -> TransportError {
    TransportError::Protocol(msg.into())
}

/// Decode one text frame.
pub fn decode(text: &str) -> Result<Frame, TransportError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or_else(|| protocol("empty frame"))?;
    let rest = chars.as_str();
    match kind {
        '0' => serde_json::from_str(rest)
            .map(Frame::Open)
            .map_err(|e| protocol(format!("bad open packet: {e}"))),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_socket(rest),
        '6' => Ok(Frame::Noop),
        other => Err(protocol(format!("unknown engine packet type `{other}`"))),
    }
}

fn decode_socket(text: &str) -> Result<Frame, TransportError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or_else(|| protocol("empty socket packet"))?;
    let (namespace, rest) = split_namespace(chars.as_str());
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let (id, body) = rest.split_at(digits);
    let id = if id.is_empty() {
        None
    } else {
        Some(id.parse::<u64>().map_err(|_| protocol("ack id overflow"))?)
    };
    let data: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).map_err(|e| protocol(format!("bad packet body: {e}")))?
    };

    match kind {
        '0' => Ok(Frame::Connect {
            namespace,
            sid: data.get("sid").and_then(Value::as_str).map(str::to_string),
        }),
        '1' => Ok(Frame::Disconnect { namespace }),
        '2' => {
            let Value::Array(mut args) = data else {
                return Err(protocol("event body is not an array"));
            };
            if args.is_empty() {
                return Err(protocol("event without a name"));
            }
            let Value::String(event) = args.remove(0) else {
                return Err(protocol("event name is not a string"));
            };
            let payload = if args.is_empty() { Value::Null } else { args.remove(0) };
            Ok(Frame::Event {
                namespace,
                ack_id: id,
                event,
                payload,
            })
        }
        '3' => {
            let id = id.ok_or_else(|| protocol("ack without id"))?;
            let payload = match data {
                Value::Array(mut args) if !args.is_empty() => args.remove(0),
                _ => Value::Null,
            };
            Ok(Frame::Ack {
                namespace,
                id,
                payload,
            })
        }
        '4' => {
            let message = match &data {
                Value::String(s) => s.clone(),
                other => other
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connect error")
                    .to_string(),
            };
            Ok(Frame::ConnectError { namespace, message })
        }
        '5' | '6' => Err(protocol("binary packets are not supported")),
        other => Err(protocol(format!("unknown socket packet type `{other}`"))),
    }
}

fn split_namespace(text: &str) -> (String, &str) {
    if text.starts_with('/') {
        match text.find(',') {
            Some(idx) => (text[..idx].to_string(), &text[idx + 1..]),
            None => (text.to_string(), ""),
        }
    } else {
        ("/".to_string(), text)
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace.is_empty() || namespace == "/" {
        String::new()
    } else {
        format!("{namespace},")
    }
}

/// Namespace connect packet.
pub fn encode_connect(namespace: &str) -> String {
    format!("40{}", namespace_prefix(namespace))
}

/// Namespace disconnect packet.
pub fn encode_disconnect(namespace: &str) -> String {
    format!("41{}", namespace_prefix(namespace))
}

/// Event packet `42[nsp,][id]["event",payload]`.
pub fn encode_event(
    namespace: &str,
    event: &str,
    payload: &Value,
    ack_id: Option<u64>,
) -> Result<String, TransportError> {
    let body = serde_json::to_string(&[Value::String(event.to_string()), payload.clone()])?;
    let id = ack_id.map(|id| id.to_string()).unwrap_or_default();
    Ok(format!("42{}{id}{body}", namespace_prefix(namespace)))
}

/// WebSocket endpoint for a server base URL.
///
/// `http(s)://` becomes `ws(s)://`; the Engine.IO path and query are
/// appended unless the URL already names a path.
pub fn endpoint(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    let after_scheme = base.split_once("://").map_or(base.as_str(), |(_, r)| r);
    if after_scheme.contains('/') {
        base
    } else {
        format!("{base}/socket.io/?EIO=4&transport=websocket")
    }
}
