use std::time::Duration;

use crate::env::{env_value, parse_duration};

/// Default total attempts for a retryable call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default consecutive failed attempts before the breaker opens.
pub const DEFAULT_CIRCUIT_THRESHOLD: u32 = 5;
/// Default time the breaker stays open.
pub const DEFAULT_CIRCUIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configures HTTP timeout, attempt limit and circuit breaker behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum number of attempts, including the first, for a retryable call.
    pub max_retries: u32,
    /// Consecutive failed attempts that open the circuit breaker.
    pub circuit_threshold: u32,
    /// How long the breaker rejects calls once open, in milliseconds.
    pub circuit_timeout_ms: u64,
    /// Value sent in the `User-Agent` header.
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: DEFAULT_MAX_RETRIES,
            circuit_threshold: DEFAULT_CIRCUIT_THRESHOLD,
            circuit_timeout_ms: DEFAULT_CIRCUIT_TIMEOUT.as_millis() as u64,
            user_agent: concat!("shopline-http/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// Total wall-clock time allowed for retries of one logical call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryBudget {
    /// No retries: the first failure is returned.
    Disabled,
    /// Retry while elapsed time plus the next delay fits in the budget.
    Limited(Duration),
    /// Retry up to the attempt limit regardless of elapsed time.
    Unlimited,
}

impl RetryBudget {
    /// Maps the signed-millisecond convention: `0` disables, negative is unlimited.
    pub fn from_signed_millis(millis: i64) -> Self {
        match millis {
            0 => Self::Disabled,
            m if m < 0 => Self::Unlimited,
            m => Self::Limited(Duration::from_millis(m as u64)),
        }
    }

    /// Whether sleeping `delay` after `elapsed` still fits.
    pub fn allows(&self, elapsed: Duration, delay: Duration) -> bool {
        match self {
            Self::Disabled => false,
            Self::Unlimited => true,
            Self::Limited(budget) => elapsed.saturating_add(delay) <= *budget,
        }
    }
}

/// Backoff and budget settings for retried attempts.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry; doubled for each further attempt.
    pub base_delay: Duration,
    /// Upper bound for the exponential delay, before jitter.
    pub max_delay: Duration,
    /// Wall-clock budget across all retries of one call.
    pub budget: RetryBudget,
    /// Fraction of each delay randomized in either direction, `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            budget: RetryBudget::Limited(Duration::from_secs(5)),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Defaults overridden by `SHOPLINE_RETRY_BASE`, `SHOPLINE_RETRY_MAX`,
    /// `SHOPLINE_RETRY_BUDGET` (durations such as `"200ms"` or `"-1s"`) and
    /// `SHOPLINE_RETRY_JITTER` (a float clamped to `0..=1`).
    ///
    /// Values that fail to parse are ignored.
    pub fn from_env() -> Self {
        Self::default().with_overrides(env_value)
    }

    pub(crate) fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let duration = |name: &str| lookup(name).and_then(|value| parse_duration(&value));

        if let Some(parsed) = duration("SHOPLINE_RETRY_BASE").filter(|d| !d.negative) {
            self.base_delay = parsed.magnitude;
        }
        if let Some(parsed) = duration("SHOPLINE_RETRY_MAX").filter(|d| !d.negative) {
            self.max_delay = parsed.magnitude;
        }
        if let Some(parsed) = duration("SHOPLINE_RETRY_BUDGET") {
            self.budget = if parsed.negative && !parsed.magnitude.is_zero() {
                RetryBudget::Unlimited
            } else if parsed.magnitude.is_zero() {
                RetryBudget::Disabled
            } else {
                RetryBudget::Limited(parsed.magnitude)
            };
        }
        if let Some(jitter) = lookup("SHOPLINE_RETRY_JITTER").and_then(|v| v.parse::<f64>().ok()) {
            if jitter.is_finite() {
                self.jitter = jitter.clamp(0.0, 1.0);
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::{ClientOptions, RetryBudget, RetryConfig};

    fn config_with(vars: &[(&str, &str)]) -> RetryConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        RetryConfig::default().with_overrides(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let options = ClientOptions::default();
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.circuit_threshold, 5);
        assert_eq!(options.circuit_timeout_ms, 30_000);
        assert!(options.user_agent.starts_with("shopline-http/"));

        let retry = RetryConfig::default();
        assert_eq!(retry.base_delay, Duration::from_millis(200));
        assert_eq!(retry.max_delay, Duration::from_secs(2));
        assert_eq!(retry.budget, RetryBudget::Limited(Duration::from_secs(5)));
        assert_eq!(retry.jitter, 0.2);
    }

    #[test]
    fn budget_sign_convention() {
        assert_eq!(RetryBudget::from_signed_millis(0), RetryBudget::Disabled);
        assert_eq!(RetryBudget::from_signed_millis(-1), RetryBudget::Unlimited);
        assert_eq!(
            RetryBudget::from_signed_millis(1_500),
            RetryBudget::Limited(Duration::from_millis(1_500))
        );
    }

    #[test]
    fn budget_allows() {
        let one_sec = Duration::from_secs(1);
        assert!(!RetryBudget::Disabled.allows(Duration::ZERO, Duration::ZERO));
        assert!(RetryBudget::Unlimited.allows(Duration::from_secs(3_600), one_sec));

        let budget = RetryBudget::Limited(Duration::from_secs(5));
        assert!(budget.allows(Duration::from_secs(4), one_sec));
        assert!(!budget.allows(Duration::from_secs(4), Duration::from_millis(1_001)));
        assert!(!RetryBudget::Limited(Duration::from_nanos(1))
            .allows(Duration::ZERO, Duration::from_millis(100)));
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = config_with(&[
            ("SHOPLINE_RETRY_BASE", "50ms"),
            ("SHOPLINE_RETRY_MAX", "1s"),
            ("SHOPLINE_RETRY_BUDGET", "10s"),
            ("SHOPLINE_RETRY_JITTER", "0.5"),
        ]);
        assert_eq!(config.base_delay, Duration::from_millis(50));
        assert_eq!(config.max_delay, Duration::from_secs(1));
        assert_eq!(config.budget, RetryBudget::Limited(Duration::from_secs(10)));
        assert_eq!(config.jitter, 0.5);
    }

    #[test]
    fn env_budget_zero_and_negative() {
        assert_eq!(
            config_with(&[("SHOPLINE_RETRY_BUDGET", "0")]).budget,
            RetryBudget::Disabled
        );
        assert_eq!(
            config_with(&[("SHOPLINE_RETRY_BUDGET", "-1s")]).budget,
            RetryBudget::Unlimited
        );
    }

    #[test]
    fn env_jitter_is_clamped_and_garbage_ignored() {
        assert_eq!(config_with(&[("SHOPLINE_RETRY_JITTER", "3")]).jitter, 1.0);
        assert_eq!(config_with(&[("SHOPLINE_RETRY_JITTER", "-0.4")]).jitter, 0.0);
        assert_eq!(config_with(&[("SHOPLINE_RETRY_JITTER", "lots")]).jitter, 0.2);
        assert_eq!(
            config_with(&[("SHOPLINE_RETRY_BASE", "soon")]).base_delay,
            Duration::from_millis(200)
        );
    }
}
