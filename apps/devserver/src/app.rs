//! Router construction and the serve loop.

use std::time::Duration;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use liverefresh_server::{LiveRefresh, inject_client_script};

use crate::config::DevServerConfig;
use crate::watch;

/// Static files from `root`, the live refresh routes, and script injection
/// into every HTML page.
pub fn create_router(config: &DevServerConfig, live: &LiveRefresh) -> Router {
    Router::new()
        .merge(live.router())
        .fallback_service(ServeDir::new(&config.root))
        .layer(axum::middleware::from_fn(inject_client_script))
        .layer(TraceLayer::new_for_http())
}

/// Runs the dev server until Ctrl-C.
pub async fn run(config: DevServerConfig) -> anyhow::Result<()> {
    let live = LiveRefresh::new(config.live_refresh.clone())?;

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = watch::spawn_watcher(
        &config.watch_paths(),
        Duration::from_millis(config.debounce_ms),
        live.clone(),
    )
    .context("failed to start file watcher")?;

    let app = create_router(&config, &live);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        address = %listener.local_addr()?,
        root = %config.root.display(),
        route = live.route(),
        "dev server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(live))
        .await?;

    Ok(())
}

/// Waits for Ctrl-C, then closes every live refresh connection.
async fn shutdown_signal(live: LiveRefresh) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received, stopping server");
    live.shutdown();
}
