//! tokio driver running a [`ClientSession`] over tokio-tungstenite.

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use liverefresh_protocol::VersionMismatch;
use liverefresh_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::config::ClientConfig;
use crate::session::{Action, ClientSession};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback invoked when the server asks for a reload.
pub type ReloadCallback = Box<dyn FnMut() + Send>;

/// Why [`LiveRefreshClient::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// A refresh arrived and the reload callback ran.
    Reloaded,
    /// The server speaks a different protocol version.
    Stopped(VersionMismatch),
    /// The endpoint is not a local development host.
    Disabled,
    /// The cancel token fired.
    Cancelled,
}

/// Connects to a live refresh endpoint and keeps reconnecting until a
/// refresh, a version mismatch, or cancellation.
pub struct LiveRefreshClient {
    config: ClientConfig,
    cancel: CancellationToken,
    on_reload: Option<ReloadCallback>,
}

impl LiveRefreshClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            on_reload: None,
        }
    }

    /// Sets the callback run on refresh.
    pub fn on_reload(mut self, callback: impl FnMut() + Send + 'static) -> Self {
        self.on_reload = Some(Box::new(callback));
        self
    }

    /// Returns a token that stops [`run`](Self::run) when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the session to completion.
    pub async fn run(mut self) -> SessionEnd {
        if !self.config.enabled {
            tracing::info!(endpoint = %self.config.endpoint, "live refresh disabled for non-local host");
            return SessionEnd::Disabled;
        }

        let mut session =
            ClientSession::new(self.config.expected_version, self.config.reconnect.clone());
        let mut socket: Option<WsStream> = None;
        let mut next = session.start();

        loop {
            let Some(action) = next.take() else {
                let Some(ws) = socket.as_mut() else {
                    // Nothing in flight and nothing to do: the session is over.
                    return match session.version_mismatch() {
                        Some(mismatch) => SessionEnd::Stopped(mismatch),
                        None => SessionEnd::Cancelled,
                    };
                };

                let frame = tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    frame = ws.next() => Some(frame),
                };
                let Some(frame) = frame else {
                    close_socket(socket.take()).await;
                    return SessionEnd::Cancelled;
                };

                next = match frame {
                    Some(Ok(Message::Text(text))) => session.on_message(text.as_str()),
                    Some(Ok(Message::Close(_))) | None => {
                        socket = None;
                        session.on_close()
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        socket = None;
                        session.on_transport_error(&e)
                    }
                };
                continue;
            };

            match action {
                Action::Connect => {
                    tracing::debug!(endpoint = %self.config.endpoint, "connecting");
                    let result = tokio::select! {
                        _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                        result = connect(&self.config.endpoint) => result,
                    };
                    next = match result {
                        Ok(ws) => {
                            socket = Some(ws);
                            session.on_open()
                        }
                        Err(e) => session.on_transport_error(&e),
                    };
                }
                Action::ScheduleReconnect { delay, .. } => {
                    socket = None;
                    tokio::select! {
                        _ = self.cancel.cancelled() => return SessionEnd::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    next = session.on_reconnect_timer();
                }
                Action::CloseTransport => {
                    close_socket(socket.take()).await;
                    next = session.on_close();
                }
                Action::Reload => {
                    if let Some(callback) = self.on_reload.as_mut() {
                        callback();
                    }
                    close_socket(socket.take()).await;
                    return SessionEnd::Reloaded;
                }
            }
        }
    }
}

async fn connect(endpoint: &str) -> Result<WsStream, crate::ClientError> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
    let (ws, _) =
        tokio_tungstenite::connect_async_with_config(endpoint, Some(ws_config), false).await?;
    Ok(ws)
}

/// Best-effort close handshake.
async fn close_socket(socket: Option<WsStream>) {
    if let Some(mut ws) = socket
        && let Err(e) = ws.close(None).await
    {
        tracing::debug!("close error: {e}");
    }
}
