//! Transport seam between the supervisor and the wire.
//!
//! A [`Connector`] opens a transport without blocking and reports everything
//! that happens on it as [`TransportEvent`]s through an [`EventSink`]. Every
//! sink is stamped with the generation of the transport it belongs to; the
//! supervisor bumps its generation on teardown and drops events from older
//! ones, so a torn-down transport can never move the state machine.

pub mod codec;
pub mod ws;

use ordercast_core::retry::Backoff;
use ordercast_core::{DisconnectReason, TransportError, TransportKind};
use serde_json::Value;
use tokio::sync::mpsc;

pub use ws::WsConnector;

/// Something that happened on a transport.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// The transport is open and the namespace joined.
    Connected {
        /// Server-assigned socket id.
        transport_id: String,
        /// Which transport carries the session.
        kind: TransportKind,
    },
    /// The first connection attempt failed.
    ConnectError {
        /// Failure text.
        message: String,
    },
    /// An open transport closed.
    Disconnected {
        /// Why it closed.
        reason: DisconnectReason,
    },
    /// The transport started reconnection attempt number `attempt` (1-based).
    ReconnectAttempt {
        /// Attempt number.
        attempt: u32,
    },
    /// The transport gave up reconnecting.
    ReconnectFailed,
    /// A named server event.
    Message {
        /// Event name.
        event: String,
        /// First event argument (`Null` when absent).
        payload: Value,
    },
    /// The server acknowledged an emit.
    Ack {
        /// Id passed to [`TransportHandle::emit`].
        id: u64,
        /// First acknowledgement argument.
        payload: Value,
    },
    /// Transport-level ping from the server.
    Ping,
    /// Transport-level pong, with the round trip if the transport measured it.
    Pong {
        /// Round-trip time in milliseconds.
        latency_ms: Option<u64>,
    },
}

/// Everything a connector needs to open one transport.
#[derive(Clone, Debug)]
pub struct ConnectRequest {
    /// Server base URL.
    pub url: String,
    /// Namespace to join.
    pub namespace: String,
    /// Transports in order of preference.
    pub transports: Vec<TransportKind>,
    /// Reconnection policy for transient loss.
    pub backoff: Backoff,
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) generation: u64,
    pub(crate) event: TransportEvent,
}

/// Where a transport reports its events.
#[derive(Clone, Debug)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { generation, tx }
    }

    /// Report an event. Returns `false` once the supervisor is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Envelope {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Generation this sink reports for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the supervisor has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open (or opening) transport.
pub trait TransportHandle: Send {
    /// Send a named event, optionally asking for an acknowledgement tagged
    /// `ack_id`.
    fn emit(&self, event: &str, payload: &Value, ack_id: Option<u64>) -> Result<(), TransportError>;

    /// Close the transport and stop any reconnection. Idempotent.
    fn close(&self);

    /// Transport currently in use.
    fn kind(&self) -> TransportKind;
}

/// Opens transports.
pub trait Connector: Send + Sync {
    /// Start opening a transport. Must not block; progress is reported on
    /// `sink`.
    fn connect(&self, request: ConnectRequest, sink: EventSink) -> Box<dyn TransportHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_stamps_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.send(TransportEvent::Ping));
        let env = rx.try_recv().unwrap();
        assert_eq!(env.generation, 7);
        assert_eq!(env.event, TransportEvent::Ping);
    }

    #[test]
    fn sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(1, tx);
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.send(TransportEvent::ReconnectFailed));
    }
}
