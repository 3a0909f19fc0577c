//! Transport seam between the session and the wire.

use std::sync::Arc;

use thiserror::Error;

/// Transport-level errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be started.
    #[error("connect failed: {message}")]
    Connect {
        /// Error details.
        message: String,
    },

    /// A frame could not be written.
    #[error("send failed: {message}")]
    Send {
        /// Error details.
        message: String,
    },

    /// The connection is gone.
    #[error("connection closed")]
    Closed,
}

/// Callbacks the transport fires from its network thread.
///
/// Implementations must return quickly; they never block on the listener.
pub trait TransportEvents: Send + Sync {
    /// The handshake completed.
    fn on_open(&self);

    /// A text frame arrived.
    fn on_message(&self, text: String);

    /// The connection ended. `None` means a locally requested close.
    fn on_close(&self, reason: Option<String>);

    /// The connection failed.
    fn on_error(&self, message: String);
}

/// Live connection handle.
pub trait TransportHandle: Send + Sync {
    /// Write one text frame.
    fn send_text(&self, text: String) -> Result<(), TransportError>;

    /// Request a close; completion is reported through `on_close`.
    fn close(&self);
}

/// Opens connections.
///
/// `open` may return before the handshake finishes; the outcome arrives as
/// `on_open`, or as `on_error`/`on_close`, possibly before `open` returns.
pub trait Transport: Send + Sync {
    /// Start connecting to `url`.
    fn open(
        &self,
        url: &str,
        events: Arc<dyn TransportEvents>,
    ) -> Result<Arc<dyn TransportHandle>, TransportError>;
}
