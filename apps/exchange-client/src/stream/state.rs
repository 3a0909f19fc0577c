//! Connection lifecycle states.

use std::fmt;

/// Current state of the streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Open; send and subscribe are valid.
    Connected,
    /// Close requested, waiting for the transport to finish.
    Closing,
}

impl ConnectionState {
    /// Check if messages can be sent.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if a connection exists or is being established.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// Lowercase name for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
