use std::{
    sync::{PoisonError, RwLock},
    time::{Duration, Instant},
};

/// Point-in-time view of the circuit breaker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CircuitState {
    /// Failed attempts since the last success.
    pub consecutive_failures: u32,
    /// Whether calls are currently being rejected.
    pub open: bool,
    /// When the breaker last transitioned to open.
    pub opened_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Counters {
    consecutive_failures: u32,
    open: bool,
    opened_at: Option<Instant>,
}

/// Consecutive-failure breaker shared by every clone of a client.
///
/// Closed until `threshold` failed attempts accumulate, then open for
/// `timeout`. The first check after the timeout closes it again and lets the
/// next call through as a probe; that call's outcome decides what happens next.
#[derive(Debug)]
pub(crate) struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    counters: RwLock<Counters>,
}

impl CircuitBreaker {
    pub(crate) fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            timeout,
            counters: RwLock::new(Counters::default()),
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        self.is_open_at(Instant::now())
    }

    pub(crate) fn is_open_at(&self, now: Instant) -> bool {
        {
            let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            if !counters.open {
                return false;
            }
            if !self.expired(&counters, now) {
                return true;
            }
        }

        // Re-check under the write lock: another caller may have reset or
        // re-opened the breaker in between.
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        if counters.open && self.expired(&counters, now) {
            counters.open = false;
            counters.consecutive_failures = 0;
            counters.opened_at = None;
        }
        counters.open
    }

    /// Records one failed attempt. Returns `true` if this failure opened the breaker.
    pub(crate) fn record_failure(&self) -> bool {
        self.record_failure_at(Instant::now())
    }

    pub(crate) fn record_failure_at(&self, now: Instant) -> bool {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        counters.consecutive_failures = counters.consecutive_failures.saturating_add(1);
        if counters.consecutive_failures >= self.threshold {
            let opened = !counters.open;
            counters.open = true;
            counters.opened_at = Some(now);
            return opened;
        }
        false
    }

    /// Records one successful attempt. Returns `true` if the breaker was open.
    pub(crate) fn record_success(&self) -> bool {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        let was_open = counters.open;
        counters.consecutive_failures = 0;
        counters.open = false;
        counters.opened_at = None;
        was_open
    }

    pub(crate) fn snapshot(&self) -> CircuitState {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        CircuitState {
            consecutive_failures: counters.consecutive_failures,
            open: counters.open,
            opened_at: counters.opened_at,
        }
    }

    /// Moves the open timestamp into the past.
    #[cfg(test)]
    pub(crate) fn backdate(&self, by: Duration) {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        counters.opened_at = counters.opened_at.and_then(|at| at.checked_sub(by));
    }

    fn expired(&self, counters: &Counters, now: Instant) -> bool {
        counters
            .opened_at
            .map_or(true, |at| now.saturating_duration_since(at) >= self.timeout)
    }
}
