//! Static file server with live refresh.
//!
//! Serves a directory, injects the live refresh client into every HTML page
//! and tells connected browsers to reload whenever a watched file changes.

mod app;
mod config;
mod watch;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use config::{DEFAULT_CONFIG_FILE, DevServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = DevServerConfig::load(&config_path)?;

    app::run(config).await
}
