use miette::Diagnostic;
use thiserror::Error;

/// Failure surfaced by [`HttpClient::request`](crate::http::HttpClient::request)
/// once retries are exhausted.
///
/// Cloneable so every caller coalesced onto the same in-flight GET observes
/// the identical outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum RequestError {
    #[error("Network error: {0}")]
    #[diagnostic(
        code(maiconsoft::http::network),
        help("Check that the backend is reachable and that CORS allows this origin")
    )]
    Network(String),

    #[error("Request timed out after {after_ms}ms")]
    #[diagnostic(
        code(maiconsoft::http::timeout),
        help("Raise request.timeout_ms or check backend latency")
    )]
    Timeout { after_ms: u64 },

    #[error("HTTP {status}: {status_text}")]
    #[diagnostic(code(maiconsoft::http::status))]
    Http { status: u16, status_text: String },

    #[error("Failed to decode response body: {0}")]
    #[diagnostic(code(maiconsoft::http::decode))]
    Decode(String),

    #[error("Shared request was dropped before it settled")]
    #[diagnostic(code(maiconsoft::http::aborted))]
    Aborted,
}

impl RequestError {
    /// HTTP status carried by the failure, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Transport failures, timeouts and error statuses may succeed on a later
    /// attempt. A body that fails to decode or a dropped shared request will not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::Network(_) | RequestError::Timeout { .. } | RequestError::Http { .. }
        )
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            RequestError::Decode(value.to_string())
        } else {
            RequestError::Network(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_and_status_failures_retry() {
        assert!(RequestError::Network("refused".into()).is_retryable());
        assert!(RequestError::Timeout { after_ms: 10 }.is_retryable());
        assert!(RequestError::Http {
            status: 503,
            status_text: "Service Unavailable".into()
        }
        .is_retryable());
        assert!(!RequestError::Decode("expected value".into()).is_retryable());
        assert!(!RequestError::Aborted.is_retryable());
    }
}
