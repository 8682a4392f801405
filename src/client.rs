use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{self, HeaderMap},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::{backoff_delay, VerbPolicy},
    breaker::{CircuitBreaker, CircuitState},
    classify::{classify_response, ERROR_BODY_LIMIT},
    debug::{debug_log_from_env, DebugLog},
    env::env_value,
    CircuitBreakerError, ClientOptions, Result, RetryConfig, ShoplineError,
};

/// Base URL of the token-scoped Shopline Open API.
pub const OPEN_API_BASE_URL: &str = "https://open.shopline.io/v1";

/// API version used by the legacy Admin API host.
pub const ADMIN_API_VERSION: &str = "v20251201";

/// Formats a store handle into the legacy Admin API base URL.
///
/// Example: `"acme"` → `"https://acme.myshopline.com/admin/openapi/v20251201"`
pub fn admin_base_url(handle: &str) -> String {
    format!(
        "https://{}.myshopline.com/admin/openapi/{ADMIN_API_VERSION}",
        handle.trim()
    )
}

#[derive(Clone)]
/// HTTP client for the Shopline REST API.
///
/// Every call goes through one executor: the circuit breaker gate, JSON
/// encoding, bounded retries with backoff, and error classification. Clones
/// share the connection pool, the breaker and the logger, so one client can
/// be handed to many tasks.
pub struct ShoplineClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    options: ClientOptions,
    retry: RetryConfig,
    breaker: Arc<CircuitBreaker>,
    log: Arc<dyn DebugLog>,
    cancel: Option<CancellationToken>,
}

impl fmt::Debug for ShoplineClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShoplineClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("options", &self.options)
            .field("retry", &self.retry)
            .field("circuit", &self.breaker.snapshot())
            .finish()
    }
}

/// Result of one attempt that reached the transport.
enum Outcome {
    Success(StatusCode, Vec<u8>),
    Rejected(ShoplineError),
    Transport(reqwest::Error),
}

impl ShoplineClient {
    /// Creates a client for the Open API (`https://open.shopline.io/v1`).
    ///
    /// Retry settings and the debug logger are read from the environment; see
    /// [`RetryConfig::from_env`] and [`crate::debug_log_from_env`].
    pub fn new(token: impl AsRef<str>) -> Self {
        Self::with_base_url(OPEN_API_BASE_URL, token)
    }

    /// Creates a client for an arbitrary base URL, e.g. a proxy or a test server.
    pub fn with_base_url(base_url: impl Into<String>, token: impl AsRef<str>) -> Self {
        let options = ClientOptions::default();
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let base_url: String = base_url.into();

        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: normalize_token(token.as_ref()),
            breaker: Arc::new(breaker_for(&options)),
            options,
            retry: RetryConfig::from_env(),
            log: Arc::from(debug_log_from_env()),
            cancel: None,
        }
    }

    /// Creates a client for the legacy Admin API host of a store handle.
    pub fn admin(handle: impl AsRef<str>, token: impl AsRef<str>) -> Self {
        Self::with_base_url(admin_base_url(handle.as_ref()), token)
    }

    /// Creates a client from environment variables.
    ///
    /// Reads:
    /// - `SHOPLINE_ACCESS_TOKEN`: access token (required, `Bearer ` prefix optional)
    /// - `SHOPLINE_BASE_URL`: base URL (optional, defaults to the Open API)
    ///
    /// # Example
    ///
    /// ```no_run
    /// use shopline_http::ShoplineClient;
    ///
    /// let client = ShoplineClient::from_env().expect("missing SHOPLINE_ACCESS_TOKEN");
    /// ```
    pub fn from_env() -> std::result::Result<Self, String> {
        let token = env_value("SHOPLINE_ACCESS_TOKEN")
            .ok_or_else(|| "missing SHOPLINE_ACCESS_TOKEN environment variable".to_owned())?;
        let base_url = env_value("SHOPLINE_BASE_URL").unwrap_or_else(|| OPEN_API_BASE_URL.to_owned());
        Ok(Self::with_base_url(base_url, token))
    }

    /// Applies timeout, attempt limit and breaker settings.
    ///
    /// The breaker is rebuilt with the new threshold and timeout, so its
    /// counters start from zero; clones made before this call keep the old one.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.breaker = Arc::new(breaker_for(&opts));
        self.options = opts;
        self
    }

    /// Replaces the backoff and budget settings.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the debug logger.
    pub fn with_logger(mut self, log: impl DebugLog + 'static) -> Self {
        self.log = Arc::new(log);
        self
    }

    /// Returns a handle whose calls abort when `token` is cancelled.
    ///
    /// The handle shares the breaker and connection pool with `self`.
    pub fn cancel_on(&self, token: CancellationToken) -> Self {
        Self {
            cancel: Some(token),
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Snapshot of the circuit breaker counters.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.snapshot()
    }

    /// Performs a GET request. `Ok(None)` means the response had no body.
    ///
    /// GET is retried on 5xx, 429 and transport failures.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let body = self.execute::<()>(Method::GET, path, None).await?;
        decode_body(&body)
    }

    /// Performs a POST request with a JSON body. Never retried.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(Method::POST, path, Some(body)).await?;
        decode_body(&body)
    }

    /// Performs a PUT request with a JSON body.
    ///
    /// Responses are not retried; a failed connection is.
    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(Method::PUT, path, Some(body)).await?;
        decode_body(&body)
    }

    /// Performs a PATCH request with a JSON body. Never retried.
    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(Method::PATCH, path, Some(body)).await?;
        decode_body(&body)
    }

    /// Performs a DELETE request and discards the response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute::<()>(Method::DELETE, path, None).await?;
        Ok(())
    }

    /// Performs a DELETE request with a JSON body.
    ///
    /// Some endpoints (bulk deletes, image removal) require a payload.
    pub async fn delete_with_body<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = self.execute(Method::DELETE, path, Some(body)).await?;
        decode_body(&body)
    }

    async fn execute<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Vec<u8>>
    where
        B: Serialize + ?Sized,
    {
        let url = join_url(&self.base_url, path);

        if self.breaker.is_open() {
            self.log
                .log(format_args!("api circuit_open=true method={method} url={url}"));
            return Err(CircuitBreakerError.into());
        }

        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(ShoplineError::Encode)?;

        let policy = VerbPolicy::for_method(&method);
        let max_attempts = self.options.max_retries.max(1);
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(ShoplineError::Cancelled);
            }

            let attempt_start = Instant::now();
            self.log.log(format_args!(
                "api request method={method} url={url} attempt={}",
                attempt + 1
            ));

            let (err, retryable) = match self.attempt(&method, &url, payload.as_deref()).await? {
                Outcome::Success(status, body) => {
                    if self.breaker.record_success() {
                        #[cfg(feature = "tracing")]
                        tracing::info!("circuit breaker closed after successful call to {}", url);
                    }
                    self.log.log(format_args!(
                        "api response method={method} url={url} status={} duration={:?}",
                        status.as_u16(),
                        attempt_start.elapsed()
                    ));
                    return Ok(body);
                }
                Outcome::Rejected(err) => {
                    self.log.log(format_args!(
                        "api response method={method} url={url} status={} duration={:?}",
                        err.status().unwrap_or_default(),
                        attempt_start.elapsed()
                    ));
                    let retryable = policy.retry_responses && is_retryable_response(&err);
                    (err, retryable)
                }
                Outcome::Transport(source) => {
                    self.log.log(format_args!(
                        "api error method={method} url={url} attempt={} duration={:?} err={source}",
                        attempt + 1,
                        attempt_start.elapsed()
                    ));
                    (ShoplineError::Transport(source), policy.retry_transport)
                }
            };

            if self.breaker.record_failure() {
                self.log.log(format_args!(
                    "api circuit opened after {} consecutive failures",
                    self.breaker.snapshot().consecutive_failures
                ));
                #[cfg(feature = "tracing")]
                tracing::warn!("circuit breaker opened after failure calling {}", url);
            }

            if !retryable || attempt + 1 >= max_attempts {
                return Err(err);
            }

            let mut delay = backoff_delay(&self.retry, attempt);
            if let Some(retry_after) = err.retry_after() {
                delay = delay.max(retry_after);
            }
            if !self.retry.budget.allows(start.elapsed(), delay) {
                self.log.log(format_args!("api retry budget_exceeded=true"));
                return Err(err);
            }

            self.log.log(format_args!("api retry delay={delay:?}"));
            #[cfg(feature = "tracing")]
            tracing::debug!("retrying {} {} after {:?}", method, url, delay);

            if !delay.is_zero() {
                self.cancellable(tokio::time::sleep(delay)).await?;
            }
            attempt += 1;
        }
    }

    async fn attempt(&self, method: &Method, url: &str, payload: Option<&[u8]>) -> Result<Outcome> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header("X-Shopline-Access-Token", &self.token)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.options.user_agent)
            .timeout(Duration::from_millis(self.options.timeout_ms));
        if let Some(payload) = payload {
            request = request.body(payload.to_vec());
        }

        let response = match self.cancellable(request.send()).await? {
            Ok(response) => response,
            Err(err) if err.is_builder() => {
                return Err(ShoplineError::InvalidRequest(err.to_string()));
            }
            Err(err) => return Ok(Outcome::Transport(err)),
        };

        let status = response.status();
        if status.is_success() {
            if status == StatusCode::NO_CONTENT {
                return Ok(Outcome::Success(status, Vec::new()));
            }
            return match self.cancellable(response.bytes()).await? {
                Ok(body) => Ok(Outcome::Success(status, body.to_vec())),
                Err(err) => Ok(Outcome::Transport(err)),
            };
        }

        let headers: HeaderMap = response.headers().clone();
        // The status is what matters; a truncated or unreadable body only
        // degrades the message.
        let body = self
            .cancellable(read_limited(response, ERROR_BODY_LIMIT))
            .await?
            .unwrap_or_default();
        Ok(Outcome::Rejected(classify_response(status, &headers, &body)))
    }

    /// Runs `fut` unless the attached cancellation token fires first.
    async fn cancellable<F: Future>(&self, fut: F) -> Result<F::Output> {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ShoplineError::Cancelled),
                output = fut => Ok(output),
            },
            None => Ok(fut.await),
        }
    }
}

fn breaker_for(options: &ClientOptions) -> CircuitBreaker {
    CircuitBreaker::new(
        options.circuit_threshold,
        Duration::from_millis(options.circuit_timeout_ms),
    )
}

fn is_retryable_response(err: &ShoplineError) -> bool {
    match err {
        ShoplineError::Api(api) => api.status >= 500,
        ShoplineError::RateLimited(_) => true,
        _ => false,
    }
}

async fn read_limited(
    mut response: reqwest::Response,
    limit: usize,
) -> std::result::Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while body.len() < limit {
        match response.chunk().await? {
            Some(chunk) => {
                let take = chunk.len().min(limit - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            None => break,
        }
    }
    Ok(body)
}

fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|err| ShoplineError::Decode(err.to_string()))
}

fn join_url(base_url: &str, path: &str) -> String {
    if path.is_empty() || path.starts_with('/') || path.starts_with('?') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

fn normalize_token(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed[7..].trim_start().to_owned()
    } else {
        trimmed.to_owned()
    }
}
