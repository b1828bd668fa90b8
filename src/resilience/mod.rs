//! Retry and circuit-breaker policies for outbound remote calls.
//!
//! The retry policy computes exponential backoff delays as pure values so
//! the schedule can be asserted without sleeping. The circuit breaker
//! tracks consecutive qualifying failures and, once open, rejects calls
//! for a cooldown window before admitting a single probe.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Base delay for the first retry.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Maximum number of retry attempts (0 = no retries, just the initial
    /// attempt).
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl RetryConfig {
    /// Calculate the delay before retry `attempt` (0-indexed).
    ///
    /// Uses exponential backoff: delay = base * 2^attempt, capped at
    /// max_delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exponential_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_ms = exponential_ms.min(self.max_delay.as_millis() as u64);
        Duration::from_millis(capped_ms)
    }

    /// Check if another retry attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Observable circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow through; failures are being counted.
    Closed,
    /// Calls are rejected without touching the network.
    Open,
    /// The cooldown has elapsed; the next call is admitted as a probe.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Circuit breaker over a remote dependency.
///
/// After `failure_threshold` consecutive recorded failures the circuit
/// opens for `open_for`. While open, `try_acquire` returns false so
/// callers fail fast. Once the window elapses a single probe call is
/// admitted (re-arming the window so concurrent callers keep failing
/// fast); a recorded success closes the circuit, a recorded failure keeps
/// it open for another window.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_for: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker that opens after `failure_threshold` consecutive
    /// failures and stays open for `open_for`.
    pub fn new(failure_threshold: u32, open_for: Duration) -> Self {
        Self {
            failure_threshold,
            open_for,
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().expect("breaker mutex poisoned")
    }

    /// Current state of the circuit.
    pub fn state(&self) -> BreakerState {
        let inner = self.lock();
        match inner.opened_at {
            None => BreakerState::Closed,
            Some(at) if at.elapsed() >= self.open_for => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        }
    }

    /// Returns true if a call may proceed.
    ///
    /// In the open window this fails fast. Once the window elapses exactly
    /// one caller is admitted per window as a recovery probe.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.opened_at {
            None => true,
            Some(at) if at.elapsed() >= self.open_for => {
                inner.opened_at = Some(Instant::now());
                true
            }
            Some(_) => false,
        }
    }

    /// Record a successful call, closing the circuit.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Record a qualifying failure.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        if inner.opened_at.is_some() {
            // Failed probe: hold the circuit open for another window.
            inner.opened_at = Some(Instant::now());
            return;
        }
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.failure_threshold {
            inner.opened_at = Some(Instant::now());
        }
    }
}
