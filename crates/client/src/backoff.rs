//! Reconnect delay policy.

use std::time::Duration;

use liverefresh_protocol::constants::{RECONNECT_BASE_DELAY, RECONNECT_MAX_DELAY};

/// Linear backoff: `base × attempt`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay unit multiplied by the attempt number.
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: RECONNECT_BASE_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
        }
    }
}

impl ReconnectConfig {
    /// Calculates the delay for a given attempt number (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(attempt)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
