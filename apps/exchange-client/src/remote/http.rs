//! Blocking HTTP implementation of [`RemoteCall`].

use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{debug, warn};

use super::{CallFailure, Params, RemoteCall};
use crate::config::ApiConfig;

/// Issues `GET {base_url}{endpoint}?{params}` with an optional bearer token.
///
/// Built on the blocking reqwest client, so it is meant to be driven from
/// pool workers. Do not construct or drop it on an async runtime thread.
#[derive(Debug, Clone)]
pub struct HttpRemoteCall {
    client: Client,
    base_url: String,
}

impl HttpRemoteCall {
    /// Create a client from API config.
    ///
    /// # Errors
    ///
    /// Returns `CallFailure::Transport` if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, CallFailure> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| CallFailure::Transport {
                endpoint: config.base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl RemoteCall for HttpRemoteCall {
    fn invoke(
        &self,
        endpoint: &str,
        params: &Params,
        token: Option<&str>,
    ) -> Result<Value, CallFailure> {
        let url = format!("{}{endpoint}", self.base_url);

        let mut request = self.client.get(&url).query(params);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| CallFailure::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let body = response.text().map_err(|e| CallFailure::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

        debug!(endpoint, status = status.as_u16(), bytes = body.len(), "Remote call completed");

        let parsed: Option<Value> = serde_json::from_str(&body).ok();

        // Exchange error objects win over the bare status code.
        if let Some(error) = parsed
            .as_ref()
            .and_then(|v| v.get("error"))
            .filter(|e| !e.is_null())
        {
            let failure = exchange_failure(endpoint, error);
            warn!(endpoint, error = %failure, "Exchange rejected call");
            return Err(failure);
        }

        if !status.is_success() {
            return Err(CallFailure::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        parsed.ok_or_else(|| CallFailure::Decode {
            endpoint: endpoint.to_string(),
            message: format!("response is not JSON: {}", truncate(&body, 200)),
        })
    }
}

fn exchange_failure(endpoint: &str, error: &Value) -> CallFailure {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map_or_else(|| error.to_string(), str::to_string);

    CallFailure::Exchange {
        endpoint: endpoint.to_string(),
        code,
        message,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
