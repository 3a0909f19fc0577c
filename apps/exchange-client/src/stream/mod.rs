//! Streaming market data session.
//!
//! Provides:
//! - [`StreamSession`] with connect/subscribe/close and automatic reconnect
//! - [`Transport`] seam with a websocket implementation ([`WsTransport`])
//! - Subscription encoding and inbound decoding with propagation delay

mod codec;
mod queue;
mod reconnect;
mod session;
mod state;
mod transport;
mod types;
mod websocket;

pub use codec::{
    BookInterval, SUBSCRIBE_METHOD, StreamMessage, book_channel, decode_message,
    server_timestamp_ms, subscription_message,
};
pub use reconnect::ReconnectPolicy;
pub use session::{MessageHandler, StreamSession};
pub use state::ConnectionState;
pub use transport::{Transport, TransportError, TransportEvents, TransportHandle};
pub use types::{StreamError, Subscription};
pub use websocket::WsTransport;
