//! Bounded retry with exponential backoff, plus a consecutive-failure
//! circuit breaker.
//!
//! The weather boundary uses the retry policy alone. Model and storage calls
//! go through `CircuitBreaker::call`, which runs the policy and fails fast
//! once a dependency has failed repeatedly.
//!
//! # Clock injection
//! Breaker functions with an `_at` suffix take `now: Instant` instead of
//! reading the clock, and `RetryPolicy::run_with_sleep` takes the sleep
//! function, so tests stay deterministic without real waiting.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// How many times to retry a call and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each following retry.
    pub base_delay: Duration,
}

/// The error returned once a retried operation gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryFailure<E> {
    pub attempts: u32,
    pub last_error: E,
}

impl<E: fmt::Display> fmt::Display for RetryFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} after {} attempt(s)", self.last_error, self.attempts)
    }
}

impl RetryPolicy {
    /// Policy for the Open-Meteo boundary: 5 retries, 0.2 s backoff factor.
    pub fn weather_default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(200),
        }
    }

    pub fn model_default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn storage_default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(retry - 1);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op`, sleeping with `std::thread::sleep` between attempts.
    pub fn run<T, E>(
        &self,
        is_transient: impl Fn(&E) -> bool,
        op: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, RetryFailure<E>> {
        self.run_with_sleep(is_transient, op, std::thread::sleep)
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent. `op` receives the 1-based attempt number.
    pub fn run_with_sleep<T, E>(
        &self,
        is_transient: impl Fn(&E) -> bool,
        mut op: impl FnMut(u32) -> Result<T, E>,
        mut sleep: impl FnMut(Duration),
    ) -> Result<T, RetryFailure<E>> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retries_used = attempt - 1;
                    if retries_used >= self.max_retries || !is_transient(&err) {
                        return Err(RetryFailure {
                            attempts: attempt,
                            last_error: err,
                        });
                    }
                    sleep(self.delay_for(attempt));
                    attempt += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

/// Why a guarded call did not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedError<E> {
    /// The breaker is open; the dependency was not called.
    Open { name: String, retry_in: Duration },
    /// The call ran and failed (after retries).
    Failed(RetryFailure<E>),
}

impl<E: fmt::Display> fmt::Display for GuardedError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardedError::Open { name, retry_in } => write!(
                f,
                "circuit '{}' open, next trial in {}s",
                name,
                retry_in.as_secs()
            ),
            GuardedError::Failed(failure) => write!(f, "{}", failure),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Opens after `failure_threshold` consecutive failed calls. While open,
/// calls fail immediately until `cooldown` has elapsed; the next call is then
/// let through as a trial. A success closes the breaker again.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: &str, failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            name: name.to_string(),
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `Ok` if a call may proceed at `now`, otherwise the remaining cooldown.
    pub fn check_at(&self, now: Instant) -> Result<(), Duration> {
        let state = self.lock();
        match state.opened_at {
            Some(opened) => {
                let elapsed = now.saturating_duration_since(opened);
                if elapsed < self.cooldown {
                    Err(self.cooldown - elapsed)
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    pub fn is_open_at(&self, now: Instant) -> bool {
        self.check_at(now).is_err()
    }

    pub fn record_success(&self) {
        let mut state = self.lock();
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut state = self.lock();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.failure_threshold {
            state.opened_at = Some(now);
        }
    }

    /// Runs `op` under `policy` unless the breaker is open.
    pub fn call<T, E>(
        &self,
        policy: &RetryPolicy,
        is_transient: impl Fn(&E) -> bool,
        op: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, GuardedError<E>> {
        self.call_with(policy, is_transient, op, Instant::now, std::thread::sleep)
    }

    /// `call` with an injected clock and sleep.
    pub fn call_with<T, E>(
        &self,
        policy: &RetryPolicy,
        is_transient: impl Fn(&E) -> bool,
        op: impl FnMut(u32) -> Result<T, E>,
        now: impl Fn() -> Instant,
        sleep: impl FnMut(Duration),
    ) -> Result<T, GuardedError<E>> {
        if let Err(retry_in) = self.check_at(now()) {
            return Err(GuardedError::Open {
                name: self.name.clone(),
                retry_in,
            });
        }

        match policy.run_with_sleep(is_transient, op, sleep) {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(failure) => {
                self.record_failure_at(now());
                Err(GuardedError::Failed(failure))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
