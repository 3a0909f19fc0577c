//! Crate-level error type.

use std::any::Any;

use thiserror::Error;

use crate::config::ConfigError;
use crate::pool::PoolError;
use crate::remote::CallFailure;
use crate::stream::StreamError;

/// Errors surfaced by [`crate::ExchangeClient`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Task pool failure.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Remote call failure.
    #[error(transparent)]
    Call(#[from] CallFailure),

    /// Streaming session failure.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The authentication response carried no access token.
    #[error("Authentication response did not contain an access token")]
    MissingAccessToken,
}

/// Render a caught panic payload as text.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
