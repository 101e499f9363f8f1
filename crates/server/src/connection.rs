//! Per-client WebSocket plumbing: read/write pumps, keepalive, send buffering.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use liverefresh_protocol::constants::{WS_PING_PERIOD, WS_PONG_WAIT};

use crate::SEND_BUFFER_SIZE;
use crate::registry::{Connection, ConnectionId, Registry, SendError};

/// Registry handle for one upgraded WebSocket.
///
/// Cloneable and cheap: wraps an `mpsc::Sender` feeding the write pump and
/// the connection's cancel token.
#[derive(Clone)]
pub struct ClientHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl Connection for ClientHandle {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }

    fn send_text(&self, text: &str) -> Result<(), SendError> {
        if self.cancel.is_cancelled() {
            return Err(SendError::Closed);
        }
        self.tx
            .try_send(Message::Text(text.into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => SendError::Full,
                TrySendError::Closed(_) => SendError::Closed,
            })
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

/// How the read side of a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// Close frame or end of stream.
    Closed,
    /// Transport error or pong timeout.
    Errored,
    /// Closed from our side (eviction or server shutdown).
    Cancelled,
}

/// Registers an upgraded socket and runs its pumps as background tasks.
///
/// The connection is removed from the registry when the read pump ends;
/// transport errors additionally force the socket closed.
pub(crate) fn spawn_connection(
    socket: WebSocket,
    registry: Arc<Registry<ClientHandle>>,
    server_cancel: &CancellationToken,
) -> ConnectionId {
    let (tx, rx) = mpsc::channel::<Message>(SEND_BUFFER_SIZE);
    let cancel = server_cancel.child_token();
    let handle = ClientHandle {
        id: ConnectionId::new(),
        tx,
        cancel: cancel.clone(),
    };
    let id = handle.id;

    let (sink, stream) = socket.split();
    tokio::spawn(write_pump(sink, rx, cancel.clone()));

    if let Err(e) = registry.accept(handle) {
        tracing::warn!(connection_id = %id, "handshake failed: {e}");
        cancel.cancel();
        return id;
    }

    tokio::spawn(async move {
        match read_pump(stream, id, cancel.clone()).await {
            ReadOutcome::Errored => {
                registry.evict(id);
            }
            ReadOutcome::Closed | ReadOutcome::Cancelled => {
                registry.remove(id);
            }
        }
        // Stops the write pump if it is still running.
        cancel.cancel();
    });

    id
}

/// Write pump: drains the send channel and sends keepalive pings.
async fn write_pump<S>(mut sink: S, mut rx: mpsc::Receiver<Message>, cancel: CancellationToken)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut ping_interval = tokio::time::interval(WS_PING_PERIOD);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping_interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            tracing::debug!("write pump send error: {e}");
                            break;
                        }
                    }
                    None => break, // Handle dropped by the registry.
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    tracing::debug!("write pump ping error: {e}");
                    break;
                }
            }
        }
    }

    cancel.cancel();
    // Best-effort close frame.
    let _ = sink.close().await;
}

/// Read pump: logs inbound frames and watches the pong deadline.
///
/// Any incoming frame resets the deadline, not only pongs.
async fn read_pump<S>(mut stream: S, id: ConnectionId, cancel: CancellationToken) -> ReadOutcome
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return ReadOutcome::Cancelled,

            () = &mut deadline => {
                tracing::warn!(connection_id = %id, "pong timeout, closing connection");
                return ReadOutcome::Errored;
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(msg)) => {
                        deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            Message::Text(text) => {
                                tracing::debug!(connection_id = %id, message = text.as_str(), "received message");
                            }
                            Message::Binary(data) => {
                                tracing::debug!(connection_id = %id, bytes = data.len(), "ignoring binary frame");
                            }
                            Message::Close(_) => return ReadOutcome::Closed,
                            Message::Ping(_) | Message::Pong(_) => {}
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(connection_id = %id, "WebSocket error: {e}");
                        return ReadOutcome::Errored;
                    }
                    None => return ReadOutcome::Closed,
                }
            }
        }
    }
}
