//! Wire protocol shared by the live refresh server and its clients.
//!
//! Two messages only, both server → client: a handshake confirmation
//! carrying the protocol version, and a refresh instruction.

pub mod constants;
pub mod message;
pub mod version;

// Re-export primary types for convenience.
pub use constants::{
    CLIENT_SCRIPT_ROUTE, DEFAULT_CONNECTION_ROUTE, MessageType, PROTOCOL_VERSION,
};
pub use message::{ProtocolError, ServerMessage};
pub use version::{VersionMismatch, check_script_version};
