//! Remote call collaborator.
//!
//! The core issues every request/response operation through [`RemoteCall`]:
//! "call endpoint E with parameters P, authenticated as token T". The
//! dispatcher treats it as an opaque function that may be invoked
//! concurrently from many workers.

mod http;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

pub use http::HttpRemoteCall;

/// Request parameters, ordered by name for stable query strings.
pub type Params = BTreeMap<String, String>;

/// Why a remote call produced no usable result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// The request never produced a response.
    #[error("Transport error calling {endpoint}: {message}")]
    Transport {
        /// Endpoint path.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response body was not valid JSON.
    #[error("Invalid response from {endpoint}: {message}")]
    Decode {
        /// Endpoint path.
        endpoint: String,
        /// Error message.
        message: String,
    },

    /// The exchange answered with an error object.
    #[error("Exchange error {code} from {endpoint}: {message}")]
    Exchange {
        /// Endpoint path.
        endpoint: String,
        /// Exchange error code.
        code: i64,
        /// Exchange error message.
        message: String,
    },
}

impl CallFailure {
    /// Endpoint the failure belongs to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Transport { endpoint, .. }
            | Self::Status { endpoint, .. }
            | Self::Decode { endpoint, .. }
            | Self::Exchange { endpoint, .. } => endpoint,
        }
    }
}

/// Execute a named remote operation with parameters.
///
/// Implementations must be safe to call from many threads at once.
pub trait RemoteCall: Send + Sync {
    /// Call `endpoint` with `params`, authenticated as `token` when present.
    fn invoke(
        &self,
        endpoint: &str,
        params: &Params,
        token: Option<&str>,
    ) -> Result<Value, CallFailure>;
}

impl<C: RemoteCall + ?Sized> RemoteCall for Arc<C> {
    fn invoke(
        &self,
        endpoint: &str,
        params: &Params,
        token: Option<&str>,
    ) -> Result<Value, CallFailure> {
        (**self).invoke(endpoint, params, token)
    }
}
