//! Client side of the live refresh channel.
//!
//! [`ClientSession`] is the reconnect state machine: it consumes transport
//! events and returns the [`Action`] to perform next, without doing any I/O
//! itself. [`LiveRefreshClient`] drives a session over a real WebSocket.

pub mod backoff;
pub mod config;
pub mod driver;
pub mod session;

pub use backoff::ReconnectConfig;
pub use config::{ClientConfig, is_local_development};
pub use driver::{LiveRefreshClient, SessionEnd};
pub use session::{Action, ClientSession, SessionState};

use tokio_tungstenite::tungstenite;

/// Errors produced by the live refresh client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid page URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}
