//! WebSocket transport over `tokio-tungstenite`.
//!
//! One background task per transport owns the socket. It performs the
//! Engine.IO/Socket.IO handshake, answers server pings, forwards events to
//! the [`EventSink`], and writes frames queued by [`TransportHandle::emit`].
//! Transient loss is retried with exponential backoff and jitter until the
//! attempt budget runs out.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use ordercast_core::{DisconnectReason, TransportError, TransportKind};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::codec::{self, Frame, OpenInfo};
use super::{ConnectRequest, Connector, EventSink, TransportEvent, TransportHandle};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens Socket.IO sessions over a native WebSocket.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl WsConnector {
    /// New connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn connect(&self, request: ConnectRequest, sink: EventSink) -> Box<dyn TransportHandle> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let namespace = normalize_namespace(&request.namespace);

        if request.transports.contains(&TransportKind::Websocket) {
            let _ = tokio::spawn(run_socket(request, sink, out_rx, cancel.clone()));
        } else {
            let _ = sink.send(TransportEvent::ConnectError {
                message: "no supported transport configured (websocket required)".into(),
            });
        }

        Box::new(WsHandle {
            out_tx,
            cancel,
            namespace,
        })
    }
}

struct WsHandle {
    out_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    namespace: String,
}

impl TransportHandle for WsHandle {
    fn emit(&self, event: &str, payload: &Value, ack_id: Option<u64>) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let frame = codec::encode_event(&self.namespace, event, payload, ack_id)?;
        self.out_tx.send(frame).map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.cancel.cancel();
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }
}

fn normalize_namespace(namespace: &str) -> String {
    if namespace.is_empty() {
        "/".to_string()
    } else if namespace.starts_with('/') {
        namespace.to_string()
    } else {
        format!("/{namespace}")
    }
}

enum SessionEnd {
    /// Closed from our side.
    Closed,
    /// Lost for the given reason.
    Lost(DisconnectReason),
}

async fn run_socket(
    request: ConnectRequest,
    sink: EventSink,
    mut out_rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let url = codec::endpoint(&request.url);
    let namespace = normalize_namespace(&request.namespace);
    let backoff = request.backoff;
    let generation = sink.generation();
    let mut attempt: u32 = 0;
    let mut reconnecting = false;

    loop {
        if reconnecting {
            if attempt >= backoff.max_attempts {
                warn!(generation, attempts = attempt, "reconnection budget exhausted");
                let _ = sink.send(TransportEvent::ReconnectFailed);
                return;
            }
            let delay = backoff.delay(attempt, rand::random::<f64>());
            attempt += 1;
            debug!(generation, attempt, delay_ms = delay.as_millis(), "reconnecting");
            let _ = sink.send(TransportEvent::ReconnectAttempt { attempt });
            tokio::select! {
                () = time::sleep(delay) => {}
                () = cancel.cancelled() => return,
            }
        }

        let opened = tokio::select! {
            r = open(&url, &namespace) => r,
            () = cancel.cancelled() => return,
        };

        match opened {
            Err(e) if !reconnecting => {
                warn!(generation, %url, error = %e, "connect failed");
                let _ = sink.send(TransportEvent::ConnectError {
                    message: e.to_string(),
                });
                return;
            }
            Err(e) => {
                debug!(generation, attempt, error = %e, "reconnect attempt failed");
            }
            Ok((ws, open_info, transport_id)) => {
                info!(generation, transport_id, "websocket transport open");
                attempt = 0;
                let _ = sink.send(TransportEvent::Connected {
                    transport_id,
                    kind: TransportKind::Websocket,
                });
                match drive(ws, &open_info, &namespace, &sink, &mut out_rx, &cancel).await {
                    SessionEnd::Closed => return,
                    SessionEnd::Lost(reason) => {
                        let transient = reason.is_transient();
                        info!(generation, %reason, transient, "websocket transport lost");
                        let _ = sink.send(TransportEvent::Disconnected { reason });
                        if !transient {
                            return;
                        }
                        reconnecting = true;
                    }
                }
            }
        }
    }
}

/// Connect and run the handshake; returns the socket, the Engine.IO
/// parameters, and the namespace socket id.
async fn open(url: &str, namespace: &str) -> Result<(WsStream, OpenInfo, String), TransportError> {
    let (mut ws, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::Io(format!("WebSocket connect: {e}")))?;

    let info = loop {
        match next_frame(&mut ws).await? {
            Frame::Open(info) => break info,
            Frame::Noop => {}
            other => {
                return Err(TransportError::Protocol(format!(
                    "expected open packet, got {other:?}"
                )));
            }
        }
    };

    send_text(&mut ws, codec::encode_connect(namespace)).await?;

    loop {
        match next_frame(&mut ws).await? {
            Frame::Connect { namespace: ns, sid } if ns == namespace => {
                let id = sid.unwrap_or_else(|| info.sid.clone());
                return Ok((ws, info, id));
            }
            Frame::ConnectError { message, .. } => return Err(TransportError::Protocol(message)),
            Frame::Ping => send_text(&mut ws, codec::PONG.to_string()).await?,
            Frame::Close => return Err(TransportError::Closed),
            _ => {}
        }
    }
}

async fn next_frame(ws: &mut WsStream) -> Result<Frame, TransportError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return codec::decode(text.as_str()),
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(TransportError::Io(e.to_string())),
        }
    }
}

async fn send_text(ws: &mut WsStream, frame: String) -> Result<(), TransportError> {
    ws.send(Message::Text(frame.into()))
        .await
        .map_err(|e| TransportError::Io(e.to_string()))
}

/// Pump one open session until it ends.
async fn drive(
    ws: WsStream,
    open_info: &OpenInfo,
    namespace: &str,
    sink: &EventSink,
    out_rx: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let liveness = Duration::from_millis(open_info.ping_interval + open_info.ping_timeout);
    let deadline = time::sleep(liveness);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Text(codec::encode_disconnect(namespace).into())).await;
                let _ = ws_tx.close().await;
                return SessionEnd::Closed;
            }
            () = &mut deadline => {
                return SessionEnd::Lost(DisconnectReason::PingTimeout);
            }
            frame = out_rx.recv() => {
                let Some(frame) = frame else {
                    let _ = ws_tx.close().await;
                    return SessionEnd::Closed;
                };
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    return SessionEnd::Lost(DisconnectReason::TransportError);
                }
            }
            msg = ws_rx.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::Lost(DisconnectReason::TransportClose);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(error = %e, "websocket read failed");
                        return SessionEnd::Lost(DisconnectReason::TransportError);
                    }
                };
                let frame = match codec::decode(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "undecodable frame");
                        return SessionEnd::Lost(DisconnectReason::ParseError);
                    }
                };
                match frame {
                    Frame::Ping => {
                        deadline.as_mut().reset(Instant::now() + liveness);
                        if ws_tx.send(Message::Text(codec::PONG.to_string().into())).await.is_err() {
                            return SessionEnd::Lost(DisconnectReason::TransportError);
                        }
                        let _ = sink.send(TransportEvent::Ping);
                    }
                    Frame::Close => return SessionEnd::Lost(DisconnectReason::TransportClose),
                    Frame::Disconnect { namespace: ns } if ns == namespace => {
                        return SessionEnd::Lost(DisconnectReason::ServerDisconnect);
                    }
                    Frame::ConnectError { namespace: ns, message } if ns == namespace => {
                        return SessionEnd::Lost(DisconnectReason::Other(message));
                    }
                    Frame::Event { namespace: ns, event, payload, .. } if ns == namespace => {
                        let _ = sink.send(TransportEvent::Message { event, payload });
                    }
                    Frame::Ack { namespace: ns, id, payload } if ns == namespace => {
                        let _ = sink.send(TransportEvent::Ack { id, payload });
                    }
                    _ => {}
                }
            }
        }
    }
}
