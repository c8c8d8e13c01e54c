//! In-memory transport for tests.
//!
//! [`RecordingConnector`] never touches the network. It remembers every
//! transport it opened and every frame sent on them, and lets a test play the
//! server by injecting [`TransportEvent`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ordercast_core::{TransportError, TransportKind};
use parking_lot::Mutex;
use serde_json::Value;

use crate::transport::{ConnectRequest, Connector, EventSink, TransportEvent, TransportHandle};

/// One `emit` observed on a recorded transport.
#[derive(Clone, Debug, PartialEq)]
pub struct SentFrame {
    /// Event name.
    pub event: String,
    /// Payload as emitted.
    pub payload: Value,
    /// Ack id, if one was requested.
    pub ack_id: Option<u64>,
}

struct Recorded {
    request: ConnectRequest,
    sink: EventSink,
    frames: Arc<Mutex<Vec<SentFrame>>>,
    closed: Arc<AtomicBool>,
}

/// A [`Connector`] that records instead of connecting.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    transports: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingConnector {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transports opened so far.
    pub fn opened(&self) -> usize {
        self.transports.lock().len()
    }

    /// Request used to open transport `index`.
    pub fn request(&self, index: usize) -> Option<ConnectRequest> {
        self.transports.lock().get(index).map(|t| t.request.clone())
    }

    /// Whether transport `index` was closed.
    pub fn is_closed(&self, index: usize) -> bool {
        self.transports
            .lock()
            .get(index)
            .is_some_and(|t| t.closed.load(Ordering::SeqCst))
    }

    /// Deliver `event` as if transport `index` produced it.
    pub fn inject_into(&self, index: usize, event: TransportEvent) -> bool {
        let sink = self.transports.lock().get(index).map(|t| t.sink.clone());
        sink.is_some_and(|s| s.send(event))
    }

    /// Deliver `event` from the most recently opened transport.
    pub fn inject(&self, event: TransportEvent) -> bool {
        let latest = self.opened().checked_sub(1);
        latest.is_some_and(|i| self.inject_into(i, event))
    }

    /// Report the latest transport as connected over WebSocket.
    pub fn accept(&self) -> bool {
        let n = self.opened();
        self.inject(TransportEvent::Connected {
            transport_id: format!("sock-{n}"),
            kind: TransportKind::Websocket,
        })
    }

    /// Deliver a named server event from the latest transport.
    pub fn server_event(&self, event: &str, payload: Value) -> bool {
        self.inject(TransportEvent::Message {
            event: event.to_string(),
            payload,
        })
    }

    /// Every frame sent on every transport, in order.
    pub fn frames(&self) -> Vec<SentFrame> {
        self.transports
            .lock()
            .iter()
            .flat_map(|t| t.frames.lock().clone())
            .collect()
    }

    /// Frames named `event` across all transports.
    pub fn sent(&self, event: &str) -> Vec<SentFrame> {
        self.frames()
            .into_iter()
            .filter(|f| f.event == event)
            .collect()
    }

    /// Frames sent on transport `index`.
    pub fn frames_on(&self, index: usize) -> Vec<SentFrame> {
        self.transports
            .lock()
            .get(index)
            .map(|t| t.frames.lock().clone())
            .unwrap_or_default()
    }
}

impl Connector for RecordingConnector {
    fn connect(&self, request: ConnectRequest, sink: EventSink) -> Box<dyn TransportHandle> {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.transports.lock().push(Recorded {
            request,
            sink,
            frames: Arc::clone(&frames),
            closed: Arc::clone(&closed),
        });
        Box::new(RecordingHandle { frames, closed })
    }
}

struct RecordingHandle {
    frames: Arc<Mutex<Vec<SentFrame>>>,
    closed: Arc<AtomicBool>,
}

impl TransportHandle for RecordingHandle {
    fn emit(&self, event: &str, payload: &Value, ack_id: Option<u64>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.frames.lock().push(SentFrame {
            event: event.to_string(),
            payload: payload.clone(),
            ack_id,
        });
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }
}
