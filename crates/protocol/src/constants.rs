use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Protocol version spoken by this build.
///
/// The browser script carries its own copy (`SCRIPT_VERSION`). Bump both
/// together on any breaking change to the wire format.
pub const PROTOCOL_VERSION: u32 = 1;

/// Default route for the WebSocket endpoint.
///
/// Deliberately noisy so it never collides with an application route.
pub const DEFAULT_CONNECTION_ROUTE: &str = "/ws-LIVE-REFRESH-RESERVED-ROUTE";

/// Route the browser client script is served from.
pub const CLIENT_SCRIPT_ROUTE: &str = "/AUTO-INJECTED-BY-LIVE-REFRESH.js";

/// Delay unit for reconnect backoff (`attempt × base`).
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(5000);

/// Upper bound for the reconnect delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// How often the server pings each client.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Time to wait for a pong (or any incoming frame) before a connection is
/// considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Maximum inbound message size in bytes (64 KiB).
///
/// Clients never need to send anything large; the server only logs what it
/// receives.
pub const WS_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Wire discriminator (`type` field) of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    #[serde(rename = "connection-confirmation")]
    ConnectionConfirmation,
    #[serde(rename = "refresh")]
    Refresh,

    /// Anything else. Receivers log and drop these.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    /// Returns the wire name of a known message type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionConfirmation => "connection-confirmation",
            Self::Refresh => "refresh",
            Self::Unknown => "unknown",
        }
    }
}
