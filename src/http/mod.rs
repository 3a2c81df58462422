pub mod cache;
pub mod client;
pub mod errors;
pub mod inflight;
pub mod retry;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use cache::{Clock, ManualClock, RequestCache, SystemClock};
pub use client::{HttpClient, LoadingIndicator, Method, NoLoading, RequestOptions};
pub use errors::RequestError;
pub use inflight::InFlightRegistry;
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, TokioSleeper, MAX_BACKOFF};

/// Response body after content negotiation.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// `Content-Type` included `application/json`.
    Json(Value),
    /// Anything else, returned verbatim.
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            Payload::Text(_) => None,
        }
    }

    /// JSON view of the body. Text bodies are parsed if they happen to be
    /// JSON and wrapped as a string otherwise.
    pub fn into_json(self) -> Value {
        match self {
            Payload::Json(v) => v,
            Payload::Text(t) => serde_json::from_str(&t).unwrap_or(Value::String(t)),
        }
    }

    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T, RequestError> {
        serde_json::from_value(self.into_json()).map_err(|e| RequestError::Decode(e.to_string()))
    }
}
