//! Exchange Client Binary
//!
//! Authenticates, subscribes to one market data channel, and logs every
//! message with its propagation delay until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin exchange-client
//! ```
//!
//! # Environment Variables
//!
//! - `EXCHANGE_CLIENT_CONFIG`: Path to the YAML config (default: config.yaml)
//! - `EXCHANGE_CLIENT_CHANNEL`: Channel to subscribe to
//!   (default: `book.BTC-PERPETUAL.100ms`)
//! - `RUST_LOG`: Log level override

use anyhow::Context;
use exchange_client::config::load_config;
use exchange_client::stream::{BookInterval, StreamMessage, book_channel};
use exchange_client::telemetry::init_telemetry;
use exchange_client::ExchangeClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS operations
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();

    let config_path = std::env::var("EXCHANGE_CLIENT_CONFIG").ok();
    let config = load_config(config_path.as_deref()).context("failed to load configuration")?;

    init_telemetry(&config.observability.logging);

    let channel = std::env::var("EXCHANGE_CLIENT_CHANNEL")
        .unwrap_or_else(|_| book_channel("BTC-PERPETUAL", BookInterval::Ms100));

    tracing::info!(
        base_url = %config.api.base_url,
        stream_url = %config.stream.url(),
        workers = config.pool.worker_count,
        channel = %channel,
        "Starting exchange client"
    );

    // The client blocks on OS threads; keep it off the async workers.
    let mut client = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let mut client = ExchangeClient::from_config(config)?;
        let token = client.authenticate().context("authentication failed")?;
        client
            .start_stream(&channel, &token, log_message)
            .context("failed to start stream")?;
        Ok(client)
    })
    .await??;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    tokio::task::spawn_blocking(move || client.shutdown()).await?;

    tracing::info!("Exchange client stopped");
    Ok(())
}

fn log_message(message: &StreamMessage) {
    tracing::info!(
        channel = message.channel().unwrap_or("-"),
        propagation_delay_ms = message.propagation_delay_ms,
        bytes = message.raw.len(),
        "Market data"
    );
}
