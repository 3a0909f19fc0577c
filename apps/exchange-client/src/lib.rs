// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::items_after_statements
    )
)]

//! Exchange Client - Rust Core Library
//!
//! Concurrency and connection-lifecycle core for an exchange trading client.
//!
//! # Architecture
//!
//! Two independent subsystems, composed only by [`ExchangeClient`]:
//!
//! - **Outbound (request/response)**: [`BatchDispatcher`] fans parameter sets
//!   out over a [`TaskPool`] of OS worker threads, each invoking a
//!   [`RemoteCall`], and fans the results back in input order.
//! - **Inbound (push)**: [`StreamSession`] owns one websocket connection, a
//!   subscription, an inbound queue drained by a listener thread, and a
//!   fixed-delay reconnect policy.
//!
//! Failures inside a worker or the listener never cross a thread boundary;
//! they come back as data (`BatchResult` entries) or as log events.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Top-level client owning the pool and the optional stream session.
pub mod client;

/// YAML configuration with environment interpolation.
pub mod config;

/// Batch fan-out / fan-in over the task pool.
pub mod dispatch;

/// Crate-level error type.
pub mod error;

/// Bounded worker pool with future-like task handles.
pub mod pool;

/// The remote call collaborator and its HTTP implementation.
pub mod remote;

/// Streaming session with reconnect.
pub mod stream;

/// Tracing subscriber setup.
pub mod telemetry;

pub use client::ExchangeClient;
pub use config::{ClientConfig, ConfigError, load_config, load_config_from_string};
pub use dispatch::{
    BatchDispatcher, BatchEntry, BatchItemError, BatchResult, BuyOrder, CancelOrder, EditOrder,
    IntoRemoteRequest, OrderType, RemoteRequest, SellOrder, Trigger,
};
pub use error::ClientError;
pub use pool::{PoolError, PoolState, TaskError, TaskHandle, TaskPool};
pub use remote::{CallFailure, HttpRemoteCall, Params, RemoteCall};
pub use stream::{
    BookInterval, ConnectionState, MessageHandler, ReconnectPolicy, StreamError, StreamMessage,
    StreamSession, Subscription, Transport, TransportError, TransportEvents, TransportHandle,
    WsTransport, book_channel,
};
