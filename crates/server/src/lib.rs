//! Server side of the live refresh channel.
//!
//! Tracks every connected browser, sends each one a handshake confirmation
//! on accept, and broadcasts refresh instructions on demand. The
//! [`LiveRefresh`] type wires this into an axum router together with the
//! browser client script and an HTML injection middleware.

mod config;
mod connection;
mod inject;
mod registry;
mod script;
mod server;

use std::path::PathBuf;

pub use config::{LiveRefreshConfig, ScriptSource};
pub use connection::ClientHandle;
pub use inject::{inject_client_script, inject_script_tag};
pub use registry::{BroadcastReport, Connection, ConnectionId, Registry, SendError};
pub use script::{EMBEDDED_SCRIPT, SCRIPT_FILE_NAME, load_script};
pub use server::LiveRefresh;

/// Per-connection send buffer capacity.
///
/// Only two message kinds exist and refreshes are rare, so a small buffer
/// is plenty. A full buffer means the browser has stopped reading.
pub const SEND_BUFFER_SIZE: usize = 32;

/// Errors produced by the live refresh server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid connection route: {0}")]
    InvalidRoute(String),

    #[error("could not load {}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("send failed: {0}")]
    Send(#[from] SendError),
}
