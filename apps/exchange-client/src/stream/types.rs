//! Stream error and subscription types.

use thiserror::Error;

/// Streaming session errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The connection did not reach `Connected`.
    #[error("connection failed: {message}")]
    ConnectFailure {
        /// Error details.
        message: String,
    },

    /// The session already has a live connection or an active listener.
    #[error("session is already connected")]
    AlreadyConnected,

    /// Operation requires a connected session.
    #[error("session is not connected")]
    NotConnected,

    /// The transport refused an outbound frame.
    #[error("failed to send message: {message}")]
    SendFailure {
        /// Error details.
        message: String,
    },

    /// Reconnection attempts exhausted.
    #[error("max reconnection attempts ({attempts}) exceeded")]
    ReconnectExhausted {
        /// Number of attempts made.
        attempts: u32,
    },

    /// An inbound frame was not valid JSON.
    #[error("failed to decode message: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The listener thread could not be spawned.
    #[error("failed to spawn listener thread: {message}")]
    Spawn {
        /// Error details.
        message: String,
    },
}

/// Channel and access token, re-sent after every reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Channel name, e.g. `book.BTC-PERPETUAL.100ms`.
    pub channel: String,
    /// Access token authorizing the private subscription.
    pub access_token: String,
}

impl Subscription {
    /// Create a subscription.
    #[must_use]
    pub fn new(channel: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            access_token: access_token.into(),
        }
    }
}
