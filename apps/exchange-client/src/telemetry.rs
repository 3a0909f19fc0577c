//! Tracing Setup
//!
//! Installs a console `tracing` subscriber driven by [`LoggingConfig`].
//!
//! # Configuration
//!
//! - `RUST_LOG`: overrides the configured level when set
//! - `observability.logging.format`: `pretty` or `json`
//!
//! # Usage
//!
//! ```rust,ignore
//! use exchange_client::telemetry::init_telemetry;
//!
//! init_telemetry(&config.observability.logging);
//! ```

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Initialize console logging.
///
/// Returns `false` when a global subscriber was already installed, in which
/// case the existing one stays in place.
pub fn init_telemetry(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_thread_names(true);

    let result = match config.format {
        LogFormat::Pretty => builder.with_ansi(true).try_init(),
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
    };

    match result {
        Ok(()) => {
            tracing::info!(
                level = %config.level,
                format = ?config.format,
                "Logging initialized"
            );
            true
        }
        Err(e) => {
            eprintln!("Tracing subscriber already installed: {e}");
            false
        }
    }
}
