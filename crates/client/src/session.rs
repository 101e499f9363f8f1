//! Reconnect state machine with version handshake.
//!
//! The session owns no transport and no timers. Each input returns at most
//! one [`Action`] for the driver to carry out, so the whole lifecycle can be
//! exercised without sockets or wall-clock time.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use liverefresh_protocol::{ServerMessage, VersionMismatch, check_script_version};

use crate::backoff::ReconnectConfig;

/// Lifecycle state of a [`ClientSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started.
    Idle,
    /// Transport connection in flight.
    Connecting,
    /// Transport open, waiting for the server's confirmation.
    AwaitingHandshake,
    /// Handshake done; refreshes are honored.
    Live,
    /// Transport gone, reconnect pending.
    Disconnected,
    /// Version mismatch. Terminal.
    Stopped,
}

/// Side effect requested by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open a new transport to the endpoint.
    Connect,
    /// Call [`ClientSession::on_reconnect_timer`] after `delay`.
    ScheduleReconnect { attempt: u32, delay: Duration },
    /// Close the current transport.
    CloseTransport,
    /// Reload the page.
    Reload,
}

/// One logical live refresh connection, across reconnects.
#[derive(Debug)]
pub struct ClientSession {
    state: SessionState,
    reconnect_attempts: u32,
    expected_version: u32,
    reconnect: ReconnectConfig,
    mismatch: Option<VersionMismatch>,
}

impl ClientSession {
    /// Creates an idle session speaking `expected_version`.
    pub fn new(expected_version: u32, reconnect: ReconnectConfig) -> Self {
        Self {
            state: SessionState::Idle,
            reconnect_attempts: 0,
            expected_version,
            reconnect,
            mismatch: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reconnects scheduled so far. Never reset.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Returns `true` once a version mismatch has ended the session.
    pub fn is_stopped(&self) -> bool {
        self.state == SessionState::Stopped
    }

    /// The mismatch that stopped the session, if any.
    pub fn version_mismatch(&self) -> Option<VersionMismatch> {
        self.mismatch
    }

    /// Makes the first connection attempt. Only valid once, from `Idle`.
    pub fn start(&mut self) -> Option<Action> {
        if self.state != SessionState::Idle {
            debug!(state = ?self.state, "session already started");
            return None;
        }
        info!("live refresh connecting");
        self.connect()
    }

    /// The transport opened.
    pub fn on_open(&mut self) -> Option<Action> {
        if self.state == SessionState::Connecting {
            self.state = SessionState::AwaitingHandshake;
        } else {
            debug!(state = ?self.state, "ignoring open event");
        }
        None
    }

    /// A text frame arrived.
    pub fn on_message(&mut self, text: &str) -> Option<Action> {
        let message = match ServerMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("ignoring message: {e}");
                return None;
            }
        };

        match message {
            ServerMessage::ConnectionConfirmation { script_version } => {
                self.on_confirmation(script_version)
            }
            ServerMessage::Refresh => {
                if self.state != SessionState::Live {
                    warn!(state = ?self.state, "refresh before confirmation ignored");
                    return None;
                }
                info!("live refresh refreshing page");
                Some(Action::Reload)
            }
        }
    }

    fn on_confirmation(&mut self, script_version: i64) -> Option<Action> {
        // The handshake happens once per transport.
        if self.state != SessionState::AwaitingHandshake {
            debug!(state = ?self.state, script_version, "ignoring confirmation");
            return None;
        }

        match check_script_version(self.expected_version, script_version) {
            Ok(()) => {
                info!(script_version, "live refresh connected");
                self.state = SessionState::Live;
                None
            }
            Err(mismatch) => {
                error!(
                    expected = mismatch.expected,
                    actual = mismatch.actual,
                    "{mismatch}; update the client script"
                );
                self.state = SessionState::Stopped;
                self.mismatch = Some(mismatch);
                Some(Action::CloseTransport)
            }
        }
    }

    /// The transport closed, or the connection attempt failed.
    pub fn on_close(&mut self) -> Option<Action> {
        match self.state {
            SessionState::Connecting | SessionState::AwaitingHandshake | SessionState::Live => {
                self.state = SessionState::Disconnected;
                self.schedule_reconnect()
            }
            SessionState::Idle | SessionState::Disconnected | SessionState::Stopped => {
                debug!(state = ?self.state, "ignoring close event");
                None
            }
        }
    }

    /// The transport failed. Handled like a close.
    pub fn on_transport_error(&mut self, err: &dyn fmt::Display) -> Option<Action> {
        warn!(state = ?self.state, "transport error: {err}");
        self.on_close()
    }

    /// The delay from [`Action::ScheduleReconnect`] elapsed.
    pub fn on_reconnect_timer(&mut self) -> Option<Action> {
        if self.is_stopped() {
            return None;
        }
        if self.state != SessionState::Disconnected {
            debug!(state = ?self.state, "transport already active, skipping reconnect");
            return None;
        }
        self.connect()
    }

    fn connect(&mut self) -> Option<Action> {
        if self.is_stopped() {
            return None;
        }
        self.state = SessionState::Connecting;
        Some(Action::Connect)
    }

    fn schedule_reconnect(&mut self) -> Option<Action> {
        if self.is_stopped() {
            return None;
        }
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        let attempt = self.reconnect_attempts;
        let delay = self.reconnect.delay_for_attempt(attempt);
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );
        Some(Action::ScheduleReconnect { attempt, delay })
    }
}
