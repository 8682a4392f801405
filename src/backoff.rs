use std::time::Duration;

use rand::Rng;
use reqwest::Method;

use crate::RetryConfig;

/// Which failures a verb may replay.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct VerbPolicy {
    /// Retry classified 5xx and 429 responses.
    pub retry_responses: bool,
    /// Retry when no response was received at all.
    pub retry_transport: bool,
}

impl VerbPolicy {
    pub(crate) fn for_method(method: &Method) -> Self {
        if *method == Method::GET || *method == Method::HEAD || *method == Method::OPTIONS {
            Self {
                retry_responses: true,
                retry_transport: true,
            }
        } else if *method == Method::PUT || *method == Method::DELETE {
            Self {
                retry_responses: false,
                retry_transport: true,
            }
        } else {
            Self {
                retry_responses: false,
                retry_transport: false,
            }
        }
    }
}

/// Exponential delay for 0-indexed `attempt`, capped and jittered.
pub(crate) fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let sample = if config.jitter > 0.0 {
        rand::rng().random_range(-1.0_f64..=1.0)
    } else {
        0.0
    };
    backoff_delay_with(config, attempt, sample)
}

/// Same as [`backoff_delay`] with the jitter draw supplied, `sample` in `-1.0..=1.0`.
pub(crate) fn backoff_delay_with(config: &RetryConfig, attempt: u32, sample: f64) -> Duration {
    if config.base_delay.is_zero() {
        return Duration::ZERO;
    }

    let multiplier = 1u32 << attempt.min(16);
    let mut delay = config.base_delay.saturating_mul(multiplier);
    if !config.max_delay.is_zero() && delay > config.max_delay {
        delay = config.max_delay;
    }

    // NaN fails every comparison, so it falls through to zero.
    let jitter = if config.jitter > 0.0 {
        config.jitter.min(1.0)
    } else {
        0.0
    };
    if jitter > 0.0 {
        let sample = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
        let jittered = delay.as_secs_f64() * (1.0 + jitter * sample);
        return if jittered <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(jittered).unwrap_or(Duration::MAX)
        };
    }
    delay
}
