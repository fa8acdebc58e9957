//! Retry executor for fallible async operations.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial call + retries); `0` is
//!   coerced to a single, non-retried attempt.
//! - Only `ResilienceError::Inner(E)` values classified retryable by the
//!   `is_retryable` predicate are retried; everything else returns
//!   immediately.
//! - The wait before retry N is `backoff.delay(N)`, optionally jittered.
//! - An optional `max_elapsed_time` budget stops retrying early: if
//!   `elapsed + wait` would exceed it, the executor gives up without
//!   sleeping.
//! - Cancellation is native: dropping the returned future aborts the current
//!   attempt or the in-progress sleep.
//!
//! The executor holds no shared state; each call owns its attempt counter and
//! elapsed-time tracking, so a policy can be shared freely across tasks.
//!
//! ```rust
//! use std::time::Duration;
//! use breakwater::{Backoff, ResilienceError, RetryPolicy};
//!
//! #[derive(Debug)]
//! struct Flaky;
//! impl std::fmt::Display for Flaky {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "flaky") }
//! }
//! impl std::error::Error for Flaky {}
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<Flaky>::builder()
//!     .max_attempts(3)
//!     .backoff(Backoff::exponential(Duration::from_millis(10)))
//!     .build();
//! let result: Result<(), _> =
//!     policy.execute(|| async { Err(ResilienceError::Inner(Flaky)) }).await;
//! assert!(result.unwrap_err().is_retry_exhausted());
//! # });
//! ```

use crate::clock::{Clock, MonotonicClock};
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::{Backoff, Jitter, ResilienceError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy combining attempt budget, backoff, jitter, and retryability
/// classification. Cheap to clone; clones share no mutable state.
pub struct RetryPolicy<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    max_elapsed: Option<Duration>,
    is_retryable: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

// Manual impl: the error type only appears behind the predicate, so clones
// must not require `E: Clone`.
impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
            jitter: self.jitter,
            max_elapsed: self.max_elapsed,
            is_retryable: self.is_retryable.clone(),
            sleeper: self.sleeper.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("max_elapsed", &self.max_elapsed)
            .field("is_retryable", &"<predicate>")
            .finish()
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Construct a builder with defaults: 3 attempts, exponential backoff from
    /// 100ms, no jitter, no elapsed-time budget, everything retryable.
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    /// Execute `operation`, retrying per policy.
    ///
    /// Returns the operation's value on the first success. A non-retryable
    /// error comes back as `Inner` without consuming further attempts; using
    /// up all attempts (or the elapsed budget) yields `RetryExhausted`
    /// wrapping the last error.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        let started = self.clock.now_millis();
        let mut attempt = 1usize;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(ResilienceError::Inner(e)) => {
                    if !(self.is_retryable)(&e) {
                        return Err(ResilienceError::Inner(e));
                    }
                    if attempt >= self.max_attempts {
                        return Err(ResilienceError::RetryExhausted { attempts: attempt, last: e });
                    }

                    let wait = self.jitter.apply(self.backoff.delay(attempt));
                    if let Some(budget) = self.max_elapsed {
                        let elapsed = Duration::from_millis(
                            self.clock.now_millis().saturating_sub(started),
                        );
                        if elapsed + wait > budget {
                            return Err(ResilienceError::RetryExhausted {
                                attempts: attempt,
                                last: e,
                            });
                        }
                    }

                    tracing::debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        "attempt failed, backing off before retry"
                    );
                    self.sleeper.sleep(wait).await;
                    attempt += 1;
                }
                // CircuitOpen / TooManyRequests / RetryExhausted are never re-retried.
                Err(other) => return Err(other),
            }
        }
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder<E> {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    max_elapsed: Option<Duration>,
    is_retryable: Arc<dyn Fn(&E) -> bool + Send + Sync>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::exponential(Duration::from_millis(100)),
            jitter: Jitter::None,
            max_elapsed: None,
            is_retryable: Arc::new(|_| true),
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Total attempts, initial call included. `0` is coerced to 1.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Backoff strategy for waits between attempts.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Jitter applied to each wait (off by default).
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Overall wall-clock budget; retrying stops once `elapsed + wait` would
    /// exceed it.
    pub fn max_elapsed_time(mut self, budget: Duration) -> Self {
        self.max_elapsed = Some(budget);
        self
    }

    /// Classify whether an operation error is worth retrying. Permanent
    /// failures (validation errors, 4xx-style rejections) should return false.
    pub fn is_retryable<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.is_retryable = Arc::new(predicate);
        self
    }

    /// Inject a sleeper (tests use [`NoopSleeper`](crate::NoopSleeper) or
    /// [`RecordingSleeper`](crate::RecordingSleeper)).
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Inject a clock for the elapsed-time budget.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> RetryPolicy<E> {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff: self.backoff,
            jitter: self.jitter,
            max_elapsed: self.max_elapsed,
            is_retryable: self.is_retryable,
            sleeper: self.sleeper,
            clock: self.clock,
        }
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
