//! axum integration: WebSocket endpoint, client script route, refresh.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio_util::sync::CancellationToken;

use liverefresh_protocol::constants::WS_MAX_MESSAGE_SIZE;
use liverefresh_protocol::{CLIENT_SCRIPT_ROUTE, PROTOCOL_VERSION, ServerMessage};

use crate::ServerError;
use crate::config::LiveRefreshConfig;
use crate::connection::{self, ClientHandle};
use crate::registry::{BroadcastReport, Registry};
use crate::script;

/// Live refresh endpoint for an axum application.
///
/// Cheap to clone; all clones share one connection registry. Merge
/// [`router`](Self::router) into the application and call
/// [`refresh`](Self::refresh) whenever served content changes.
#[derive(Clone)]
pub struct LiveRefresh {
    inner: Arc<Inner>,
}

struct Inner {
    config: LiveRefreshConfig,
    registry: Arc<Registry<ClientHandle>>,
    cancel: CancellationToken,
}

impl LiveRefresh {
    /// Creates an endpoint with no connected clients.
    pub fn new(config: LiveRefreshConfig) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry: Arc::new(Registry::new(PROTOCOL_VERSION)),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Returns the WebSocket route.
    pub fn route(&self) -> &str {
        &self.inner.config.route
    }

    /// Returns the routes serving the WebSocket endpoint and the client
    /// script. Merge into the application router.
    pub fn router<S>(&self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new()
            .route(self.route(), get(ws_handler))
            .route(CLIENT_SCRIPT_ROUTE, get(script_handler))
            .with_state(self.clone())
    }

    /// Tells every connected client to reload.
    pub fn refresh(&self) -> Result<BroadcastReport, ServerError> {
        let report = self.inner.registry.broadcast(&ServerMessage::Refresh)?;
        tracing::info!(
            delivered = report.delivered,
            skipped = report.skipped,
            pruned = report.pruned,
            "refresh triggered for all clients"
        );
        Ok(report)
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Closes every connection and rejects further upgrades.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
        let closed = self.inner.registry.close_all();
        tracing::info!(closed, "live refresh shut down");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(live): State<LiveRefresh>) -> Response {
    if live.inner.cancel.is_cancelled() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.max_message_size(WS_MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            let inner = &live.inner;
            connection::spawn_connection(socket, Arc::clone(&inner.registry), &inner.cancel);
        })
}

async fn script_handler(State(live): State<LiveRefresh>) -> Response {
    script::serve_script(&live.inner.config.script, live.route()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, header};
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
    use tower::ServiceExt;

    type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(live: &LiveRefresh) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app: Router = live.router();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn connect(addr: SocketAddr, route: &str) -> WsStream {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}{route}"))
            .await
            .expect("should connect");
        ws
    }

    async fn next_text(ws: &mut WsStream) -> String {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out waiting for message")
                .expect("stream ended")
                .expect("WebSocket error");
            if let Message::Text(text) = msg {
                return text.as_str().to_owned();
            }
        }
    }

    async fn wait_for_clients(live: &LiveRefresh, expected: usize) {
        for _ in 0..100 {
            if live.client_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "expected {expected} clients, have {}",
            live.client_count()
        );
    }

    #[test]
    fn new_rejects_invalid_route() {
        let err = LiveRefresh::new(LiveRefreshConfig::with_route("no-slash")).err();
        assert!(matches!(err, Some(ServerError::InvalidRoute(_))));
    }

    #[tokio::test]
    async fn client_receives_confirmation_then_refresh() {
        let live = LiveRefresh::new(LiveRefreshConfig::default()).unwrap();
        let addr = start(&live).await;
        let mut ws = connect(addr, live.route()).await;

        assert_eq!(
            next_text(&mut ws).await,
            r#"{"type":"connection-confirmation","scriptVersion":1}"#
        );
        assert_eq!(live.client_count(), 1);

        let report = live.refresh().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(next_text(&mut ws).await, r#"{"type":"refresh"}"#);
    }

    #[tokio::test]
    async fn refresh_reaches_every_client() {
        let live = LiveRefresh::new(LiveRefreshConfig::with_route("/__live")).unwrap();
        let addr = start(&live).await;

        let mut clients = Vec::new();
        for _ in 0..3 {
            let mut ws = connect(addr, "/__live").await;
            next_text(&mut ws).await;
            clients.push(ws);
        }
        assert_eq!(live.client_count(), 3);

        live.refresh().unwrap();
        for ws in &mut clients {
            assert_eq!(next_text(ws).await, r#"{"type":"refresh"}"#);
        }
    }

    #[tokio::test]
    async fn closed_client_is_removed() {
        let live = LiveRefresh::new(LiveRefreshConfig::default()).unwrap();
        let addr = start(&live).await;

        let mut ws = connect(addr, live.route()).await;
        next_text(&mut ws).await;
        let mut other = connect(addr, live.route()).await;
        next_text(&mut other).await;
        assert_eq!(live.client_count(), 2);

        ws.close(None).await.unwrap();
        wait_for_clients(&live, 1).await;

        let report = live.refresh().unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(next_text(&mut other).await, r#"{"type":"refresh"}"#);
    }

    #[tokio::test]
    async fn client_messages_are_accepted_and_ignored() {
        let live = LiveRefresh::new(LiveRefreshConfig::default()).unwrap();
        let addr = start(&live).await;
        let mut ws = connect(addr, live.route()).await;
        next_text(&mut ws).await;

        ws.send(Message::Text("hello from the page".into()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(live.client_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_closes_clients() {
        let live = LiveRefresh::new(LiveRefreshConfig::default()).unwrap();
        let addr = start(&live).await;
        let mut ws = connect(addr, live.route()).await;
        next_text(&mut ws).await;

        live.shutdown();
        assert_eq!(live.client_count(), 0);

        let ended = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(ended.is_ok(), "client should observe the close");
    }

    #[tokio::test]
    async fn refresh_without_clients_is_a_no_op() {
        let live = LiveRefresh::new(LiveRefreshConfig::default()).unwrap();
        assert_eq!(live.refresh().unwrap(), BroadcastReport::default());
    }

    #[tokio::test]
    async fn router_serves_client_script() {
        let live = LiveRefresh::new(LiveRefreshConfig::with_route("/__live")).unwrap();
        let app: Router = live.router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri(CLIENT_SCRIPT_ROUTE)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/javascript"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let script = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(script.contains(r#""/__live""#));
    }
}
