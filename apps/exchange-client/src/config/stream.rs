//! Streaming session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Websocket endpoint and reconnect tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Host to connect to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to connect to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request path of the websocket endpoint.
    #[serde(default = "default_path")]
    pub path: String,
    /// Use TLS (`wss`) when true, plain `ws` otherwise.
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// Maximum wait for the connection to open, in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Poll interval while waiting for the connection to open.
    #[serde(default = "default_connect_poll_interval")]
    pub connect_poll_interval_ms: u64,
    /// Listener wait timeout on an empty inbound queue.
    #[serde(default = "default_listener_poll_interval")]
    pub listener_poll_interval_ms: u64,
    /// Fixed delay before each reconnect attempt, in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Maximum consecutive reconnect attempts.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl StreamConfig {
    /// Websocket URL for the configured host and port.
    #[must_use]
    pub fn url(&self) -> String {
        self.url_for(&self.host, self.port)
    }

    /// Websocket URL for an explicit host and port, keeping scheme and path.
    #[must_use]
    pub fn url_for(&self, host: &str, port: u16) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{host}:{port}{}", self.path)
    }

    /// Connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Connect poll interval as a `Duration`.
    #[must_use]
    pub const fn connect_poll_interval(&self) -> Duration {
        Duration::from_millis(self.connect_poll_interval_ms)
    }

    /// Listener poll interval as a `Duration`.
    #[must_use]
    pub const fn listener_poll_interval(&self) -> Duration {
        Duration::from_millis(self.listener_poll_interval_ms)
    }

    /// Reconnect delay as a `Duration`.
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            secure: default_secure(),
            connect_timeout_ms: default_connect_timeout(),
            connect_poll_interval_ms: default_connect_poll_interval(),
            listener_poll_interval_ms: default_listener_poll_interval(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

fn default_host() -> String {
    "test.deribit.com".to_string()
}

const fn default_port() -> u16 {
    443
}

fn default_path() -> String {
    "/ws/api/v2/".to_string()
}

const fn default_secure() -> bool {
    true
}

const fn default_connect_timeout() -> u64 {
    5000
}

const fn default_connect_poll_interval() -> u64 {
    100
}

const fn default_listener_poll_interval() -> u64 {
    10
}

const fn default_reconnect_delay() -> u64 {
    5000
}

const fn default_max_reconnect_attempts() -> u32 {
    5
}
