use std::time::Duration;

use serde::Deserialize;

/// Error returned by the Shopline API for a non-success response.
///
/// `code` is either the server-supplied code or a synthesized `HTTP_<status>`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, thiserror::Error)]
#[error("api error {status} ({code}): {message}")]
pub struct ApiError {
    /// HTTP status code of the response.
    #[serde(skip)]
    pub status: u16,
    /// Short machine-readable error code.
    #[serde(default)]
    pub code: String,
    /// Human-readable error message.
    #[serde(default)]
    pub message: String,
}

/// The server answered `429 Too Many Requests`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("rate limited, retry after {retry_after:?}")]
pub struct RateLimitError {
    /// How long the server asked the caller to wait.
    pub retry_after: Duration,
}

/// The circuit breaker is open; the call never reached the network.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker is open: too many consecutive failures, try again later")]
pub struct CircuitBreakerError;

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ShoplineError {
    /// Non-success HTTP status (other than 429) classified from the response.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// HTTP 429 that was not (or no longer) retried.
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    /// Rejected locally because the circuit breaker is open.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitBreakerError),
    /// No response was received (connect failure, timeout, broken body).
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    /// The request body could not be serialised.
    #[error("failed to marshal request body: {0}")]
    Encode(serde_json::Error),
    /// A 2xx response body could not be decoded into the result type.
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// The request could not be built, e.g. a malformed URL.
    #[error("failed to create request: {0}")]
    InvalidRequest(String),
    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,
}

impl ShoplineError {
    /// HTTP status carried by the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(err) => Some(err.status),
            Self::RateLimited(_) => Some(429),
            Self::Transport(err) => err.status().map(|status| status.as_u16()),
            _ => None,
        }
    }

    /// Server-requested wait for rate-limited calls.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(err) => Some(err.retry_after),
            _ => None,
        }
    }

    /// Whether the failure came from the backend and may succeed later.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api(err) => err.status >= 500,
            Self::RateLimited(_) | Self::Transport(_) | Self::CircuitOpen(_) => true,
            Self::Encode(_) | Self::Decode(_) | Self::InvalidRequest(_) | Self::Cancelled => false,
        }
    }
}
