//! Registry of live client connections.
//!
//! The registry owns every accepted connection until it closes or fails.
//! It is transport-agnostic: anything implementing [`Connection`] can be
//! tracked, which keeps the broadcast logic testable without sockets.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use liverefresh_protocol::ServerMessage;

use crate::ServerError;

/// Identity of a tracked connection. Carries no meaning beyond set
/// membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Error returned when a message cannot be queued on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The per-connection send buffer is full (slow receiver).
    #[error("send buffer full")]
    Full,
    /// The transport is gone.
    #[error("connection closed")]
    Closed,
}

/// Handle to one live transport session.
pub trait Connection: Send + Sync {
    /// Returns the identity used for registry membership.
    fn id(&self) -> ConnectionId;

    /// Returns `true` while the transport is observably open.
    fn is_open(&self) -> bool;

    /// Queues a text frame without blocking.
    fn send_text(&self, text: &str) -> Result<(), SendError>;

    /// Forces the transport closed.
    fn close(&self);
}

/// Outcome of a [`Registry::broadcast`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the message was queued on.
    pub delivered: usize,
    /// Open connections whose buffer was full; they keep their registration.
    pub skipped: usize,
    /// Stale connections removed during the broadcast.
    pub pruned: usize,
}

/// Set of live connections plus the protocol version announced to them.
pub struct Registry<C> {
    connections: Mutex<HashMap<ConnectionId, C>>,
    script_version: u32,
}

impl<C: Connection> Registry<C> {
    /// Creates an empty registry announcing `script_version` on accept.
    pub fn new(script_version: u32) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            script_version,
        }
    }

    // Critical sections never panic, but a poisoned set is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, C>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection and sends it the handshake confirmation.
    ///
    /// If the transport is already closed by the time the confirmation is
    /// queued, the connection is unregistered again and
    /// [`SendError::Closed`] is returned.
    pub fn accept(&self, connection: C) -> Result<(), ServerError> {
        let confirmation = ServerMessage::confirmation(self.script_version).to_json()?;
        let id = connection.id();

        let mut connections = self.lock();
        connections.insert(id, connection);

        let sent = match connections.get(&id) {
            Some(conn) => conn.send_text(&confirmation),
            None => Err(SendError::Closed),
        };

        match sent {
            Ok(()) => {
                tracing::info!(connection_id = %id, clients = connections.len(), "client connected");
                Ok(())
            }
            Err(SendError::Full) => {
                // A fresh buffer is never full; keep the registration anyway.
                tracing::warn!(connection_id = %id, "confirmation dropped, send buffer full");
                Ok(())
            }
            Err(SendError::Closed) => {
                connections.remove(&id);
                tracing::debug!(connection_id = %id, "client closed before confirmation");
                Err(ServerError::Send(SendError::Closed))
            }
        }
    }

    /// Unregisters a connection. Returns `None` if it was not registered.
    pub fn remove(&self, id: ConnectionId) -> Option<C> {
        let mut connections = self.lock();
        let removed = connections.remove(&id);
        if removed.is_some() {
            tracing::info!(connection_id = %id, clients = connections.len(), "client disconnected");
        }
        removed
    }

    /// Unregisters a failed connection and forces its transport closed.
    pub fn evict(&self, id: ConnectionId) -> Option<C> {
        let removed = self.remove(id);
        if let Some(conn) = &removed {
            conn.close();
        }
        removed
    }

    /// Sends `message` to every open connection.
    ///
    /// The message is serialized once. Connections that turn out to be
    /// closed are removed as part of the same pass. A failed send never
    /// aborts the remaining ones and is not retried.
    pub fn broadcast(&self, message: &ServerMessage) -> Result<BroadcastReport, ServerError> {
        let json = message.to_json()?;
        let mut report = BroadcastReport::default();

        self.lock().retain(|id, conn| {
            if !conn.is_open() {
                tracing::debug!(connection_id = %id, "pruning stale client");
                report.pruned += 1;
                return false;
            }
            match conn.send_text(&json) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(SendError::Full) => {
                    tracing::warn!(connection_id = %id, "send buffer full, skipping client");
                    report.skipped += 1;
                    true
                }
                Err(SendError::Closed) => {
                    tracing::debug!(connection_id = %id, "client closed during broadcast");
                    report.pruned += 1;
                    false
                }
            }
        });

        Ok(report)
    }

    /// Closes and unregisters every connection. Returns how many there were.
    pub fn close_all(&self) -> usize {
        let drained: Vec<C> = self.lock().drain().map(|(_, conn)| conn).collect();
        for conn in &drained {
            conn.close();
        }
        drained.len()
    }

    /// Returns `true` if the connection is registered.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
