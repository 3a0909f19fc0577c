//! Subscription encoding and inbound message decoding.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

use super::types::{StreamError, Subscription};

/// JSON-RPC method for private channel subscriptions.
pub const SUBSCRIBE_METHOD: &str = "private/subscribe";

/// Build the subscription request for one channel.
#[must_use]
pub fn subscription_message(id: u64, subscription: &Subscription) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": SUBSCRIBE_METHOD,
        "params": {
            "access_token": subscription.access_token,
            "channels": [subscription.channel],
        }
    })
    .to_string()
}

/// Decoded inbound message.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Raw frame text.
    pub raw: String,
    /// Parsed JSON.
    pub payload: Value,
    /// Local receive time.
    pub received_at: DateTime<Utc>,
    /// `local_now - params.data.timestamp` in milliseconds, when present.
    pub propagation_delay_ms: Option<i64>,
}

impl StreamMessage {
    /// Notification method, e.g. `subscription`.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.payload.get("method").and_then(Value::as_str)
    }

    /// Channel of a subscription notification.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.payload.pointer("/params/channel").and_then(Value::as_str)
    }

    /// Notification data.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.payload.pointer("/params/data")
    }

    /// Request id of a response frame.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        self.payload.get("id").and_then(Value::as_u64)
    }
}

/// Parse a raw frame and compute its propagation delay.
pub fn decode_message(raw: String) -> Result<StreamMessage, StreamError> {
    let payload: Value = serde_json::from_str(&raw).map_err(|e| StreamError::Decode {
        message: e.to_string(),
    })?;

    let received_at = Utc::now();
    let propagation_delay_ms =
        server_timestamp_ms(&payload).map(|ts| received_at.timestamp_millis() - ts);

    Ok(StreamMessage {
        raw,
        payload,
        received_at,
        propagation_delay_ms,
    })
}

/// Server-side timestamp in epoch milliseconds, at `params.data.timestamp`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn server_timestamp_ms(payload: &Value) -> Option<i64> {
    let ts = payload.pointer("/params/data/timestamp")?;
    ts.as_i64().or_else(|| ts.as_f64().map(|f| f as i64))
}

/// Order book channel aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookInterval {
    /// Snapshot every 100 milliseconds.
    Ms100,
    /// Every change.
    Raw,
    /// Aggregated updates.
    Agg2,
}

impl BookInterval {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ms100 => "100ms",
            Self::Raw => "raw",
            Self::Agg2 => "agg2",
        }
    }
}

impl fmt::Display for BookInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order book channel name, `book.<instrument>.<interval>`.
#[must_use]
pub fn book_channel(instrument_name: &str, interval: BookInterval) -> String {
    format!("book.{instrument_name}.{interval}")
}
