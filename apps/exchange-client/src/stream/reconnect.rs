//! Reconnection Policy with a Fixed Delay

use std::time::Duration;

use crate::config::StreamConfig;

/// Fixed-delay reconnect policy with an attempt cap.
///
/// The counter resets on every successful connection, so the cap bounds
/// consecutive failures only.
#[derive(Debug)]
pub struct ReconnectPolicy {
    /// Delay before each attempt.
    delay: Duration,
    /// Maximum attempts before giving up.
    max_attempts: u32,
    /// Current attempt count.
    current_attempt: u32,
}

impl ReconnectPolicy {
    /// Create a reconnect policy from configuration.
    #[must_use]
    pub const fn new(config: &StreamConfig) -> Self {
        Self::with_params(config.reconnect_delay(), config.max_reconnect_attempts)
    }

    /// Create with custom parameters.
    #[must_use]
    pub const fn with_params(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
            current_attempt: 0,
        }
    }

    /// Claim the next attempt and return the delay to wait before it.
    ///
    /// Returns `None` once max attempts have been used.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        self.current_attempt += 1;

        Some(self.delay)
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Get the current attempt count.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Get the maximum attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay applied before every attempt.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::with_params(Duration::from_millis(5000), 5)
    }
}
