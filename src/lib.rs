//! `shopline-http` is the request executor behind a Shopline REST client.
//!
//! Resource wrappers call one of the verbs on [`ShoplineClient`]:
//! - [`ShoplineClient::get`]
//! - [`ShoplineClient::post`], [`ShoplineClient::put`], [`ShoplineClient::patch`]
//! - [`ShoplineClient::delete`], [`ShoplineClient::delete_with_body`]
//!
//! Each call is gated by a shared circuit breaker, retried under a wall-clock
//! budget when the verb allows it, and classified into a [`ShoplineError`].

mod backoff;
mod breaker;
mod classify;
mod client;
mod debug;
mod env;
mod error;
mod options;
mod retry_after;

pub use breaker::CircuitState;
pub use client::{admin_base_url, ShoplineClient, ADMIN_API_VERSION, OPEN_API_BASE_URL};
pub use debug::{debug_log_from_env, DebugLog, NopLog, WriterLog};
#[cfg(feature = "tracing")]
pub use debug::TracingLog;
pub use error::{ApiError, CircuitBreakerError, RateLimitError, ShoplineError};
pub use options::{
    ClientOptions, RetryBudget, RetryConfig, DEFAULT_CIRCUIT_THRESHOLD, DEFAULT_CIRCUIT_TIMEOUT,
    DEFAULT_MAX_RETRIES,
};
pub use retry_after::{parse_retry_after, DEFAULT_RETRY_AFTER};
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ShoplineError>;
