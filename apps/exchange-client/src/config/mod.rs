//! Configuration module for the exchange client.
//!
//! Provides configuration loading, validation, and environment variable
//! interpolation for the API credentials, the task pool, and the streaming
//! session.
//!
//! # Usage
//!
//! ```rust,ignore
//! use exchange_client::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/config.yaml"))?;
//!
//! println!("workers: {}", config.pool.worker_count);
//! ```

mod api;
mod observability;
mod pool;
mod stream;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use api::ApiConfig;
pub use observability::{LogFormat, LoggingConfig, ObservabilityConfig};
pub use pool::PoolConfig;
pub use stream::StreamConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Request/response API configuration.
    #[serde(default)]
    pub api: ApiConfig,
    /// Task pool configuration.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Streaming session configuration.
    #[serde(default)]
    pub stream: StreamConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<ClientConfig, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<ClientConfig, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: ClientConfig = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map(|m| m.as_str());
        match cap.get(1).map(|m| std::env::var(m.as_str())) {
            Some(Ok(v)) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.api.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "api.base_url must not be empty".to_string(),
        ));
    }

    if config.api.request_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "api.request_timeout_ms must be positive".to_string(),
        ));
    }

    if config.pool.worker_count == 0 {
        return Err(ConfigError::ValidationError(
            "pool.worker_count must be at least 1".to_string(),
        ));
    }

    let stream = &config.stream;
    if stream.host.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "stream.host must not be empty".to_string(),
        ));
    }

    for (name, value) in [
        ("connect_timeout_ms", stream.connect_timeout_ms),
        ("connect_poll_interval_ms", stream.connect_poll_interval_ms),
        ("listener_poll_interval_ms", stream.listener_poll_interval_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!(
                "stream.{name} must be positive"
            )));
        }
    }

    if stream.connect_poll_interval_ms > stream.connect_timeout_ms {
        return Err(ConfigError::ValidationError(
            "stream.connect_poll_interval_ms must not exceed connect_timeout_ms".to_string(),
        ));
    }

    if !stream.path.starts_with('/') {
        return Err(ConfigError::ValidationError(
            "stream.path must start with '/'".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use test_case::test_case;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();

        assert_eq!(config.pool.worker_count, 4);
        assert_eq!(config.stream.port, 443);
        assert_eq!(config.stream.path, "/ws/api/v2/");
        assert!(config.stream.secure);
        assert_eq!(config.stream.connect_timeout_ms, 5000);
        assert_eq!(config.stream.connect_poll_interval_ms, 100);
        assert_eq!(config.stream.listener_poll_interval_ms, 10);
        assert_eq!(config.stream.reconnect_delay_ms, 5000);
        assert_eq!(config.stream.max_reconnect_attempts, 5);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_load_minimal_config() {
        let config = match load_config_from_string("pool:\n  worker_count: 8\n") {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.pool.worker_count, 8);
        assert_eq!(config.stream.host, "test.deribit.com");
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "host: ${EXCHANGE_CLIENT_TEST_NONEXISTENT_VAR:-localhost}";
        assert_eq!(interpolate_env_vars(input), "host: localhost");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);

        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "client_secret: ${EXCHANGE_CLIENT_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "client_secret: ");
    }

    #[test_case("pool:\n  worker_count: 0\n", "worker_count" ; "zero workers")]
    #[test_case("api:\n  base_url: \"\"\n", "base_url" ; "empty base url")]
    #[test_case("api:\n  request_timeout_ms: 0\n", "request_timeout_ms" ; "zero request timeout")]
    #[test_case("stream:\n  connect_timeout_ms: 0\n", "connect_timeout_ms" ; "zero connect timeout")]
    #[test_case("stream:\n  listener_poll_interval_ms: 0\n", "listener_poll_interval_ms" ; "zero listener poll")]
    #[test_case("stream:\n  host: \"\"\n", "host" ; "empty host")]
    #[test_case("stream:\n  path: ws\n", "path" ; "relative path")]
    #[test_case(
        "stream:\n  connect_timeout_ms: 50\n  connect_poll_interval_ms: 100\n",
        "connect_poll_interval_ms" ;
        "poll longer than timeout"
    )]
    fn test_validation_rejects(yaml: &str, needle: &str) {
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected validation error for {yaml:?}");
        };
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains(needle), "{err}");
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
api:
  base_url: "https://www.deribit.com"
  client_id: "${EXCHANGE_CLIENT_TEST_ID:-abc}"
  client_secret: "${EXCHANGE_CLIENT_TEST_SECRET:-xyz}"
  request_timeout_ms: 2500

pool:
  worker_count: 2

stream:
  host: "127.0.0.1"
  port: 9001
  secure: false
  reconnect_delay_ms: 50
  max_reconnect_attempts: 3

observability:
  logging:
    level: debug
    format: json
"#;

        let config = load_config_from_string(yaml).unwrap();
        assert_eq!(config.api.base_url, "https://www.deribit.com");
        assert_eq!(config.api.client_id, "abc");
        assert_eq!(config.api.client_secret, "xyz");
        assert_eq!(config.api.request_timeout_ms, 2500);
        assert_eq!(config.pool.worker_count, 2);
        assert_eq!(config.stream.url(), "ws://127.0.0.1:9001/ws/api/v2/");
        assert_eq!(config.stream.max_reconnect_attempts, 3);
        assert_eq!(config.observability.logging.level, "debug");
        assert_eq!(config.observability.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pool:\n  worker_count: 3").unwrap();

        let path = file.path().to_str().unwrap();
        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.pool.worker_count, 3);
    }

    #[test]
    fn test_bundled_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml");
        let config = load_config(Some(path)).unwrap();

        assert_eq!(config.pool.worker_count, 4);
        assert_eq!(config.stream.port, 443);
        assert_eq!(config.stream.path, "/ws/api/v2/");
        assert_eq!(config.stream.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");

        let err = load_config(path.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let err = load_config_from_string("pool: [unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }
}
