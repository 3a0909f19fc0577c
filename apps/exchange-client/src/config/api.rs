//! Request/response API configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exchange API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL prepended to every endpoint path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// OAuth client id (from environment variable).
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret (from environment variable).
    #[serde(default)]
    pub client_secret: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

impl ApiConfig {
    /// Per-request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Whether both client credentials are present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://test.deribit.com".to_string()
}

const fn default_request_timeout() -> u64 {
    10_000
}
