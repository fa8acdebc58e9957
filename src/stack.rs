//! Composition point wrapping one logical operation in breaker-then-retry.
//!
//! The breaker sits outermost: one admission per logical operation, with the
//! retry executor's attempts all happening inside that single admission. A
//! retried-to-exhaustion call therefore costs the breaker exactly one
//! failure, and an open breaker short-circuits before any attempt is made.
//!
//! Coordination primitives (locks, rate limits) are used around
//! shared-resource sections directly; they do not pass through the breaker.

use crate::circuit_breaker::{CircuitBreaker, Counts};
use crate::{ResilienceError, RetryPolicy};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reference trip policy: trip once the window has seen at least
/// `min_requests` and the failure ratio reaches `ratio`. Ratio is computed
/// over the current generation's counts only, so a freshly-reset window
/// starts innocent.
pub fn failure_ratio_trip(min_requests: u32, ratio: f64) -> impl Fn(&Counts) -> bool {
    move |counts| counts.requests >= min_requests && counts.failure_ratio() >= ratio
}

/// Breaker-wrapped retry executor for one logical dependency.
#[derive(Debug, Clone)]
pub struct ResilienceStack<E> {
    breaker: CircuitBreaker,
    retry: RetryPolicy<E>,
}

impl<E> ResilienceStack<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn builder(name: impl Into<String>) -> ResilienceStackBuilder<E> {
        ResilienceStackBuilder::new(name)
    }

    /// Execute `operation` under breaker admission with retries inside.
    pub async fn execute<T, Fut, Op>(&self, operation: Op) -> Result<T, ResilienceError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, ResilienceError<E>>> + Send,
        Op: FnMut() -> Fut + Send,
    {
        // The retry executor needs FnMut while the breaker takes FnOnce;
        // a mutex cell bridges the two without cloning the operation.
        let op_cell = Arc::new(Mutex::new(operation));
        let retry = self.retry.clone();

        self.breaker
            .execute(|| async move {
                retry
                    .execute(|| {
                        let mut op = op_cell.lock().expect("operation mutex poisoned");
                        (*op)()
                    })
                    .await
            })
            .await
    }

    /// The breaker guarding this stack (state/counts introspection).
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

/// Builder for [`ResilienceStack`].
pub struct ResilienceStackBuilder<E> {
    name: String,
    breaker: Option<CircuitBreaker>,
    retry: Option<RetryPolicy<E>>,
}

impl<E> ResilienceStackBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), breaker: None, retry: None }
    }

    /// Use a pre-built breaker instead of the default.
    pub fn breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Use a pre-built retry policy instead of the default.
    pub fn retry(mut self, retry: RetryPolicy<E>) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Defaults: breaker tripping at >= 3 requests with >= 60% failures and a
    /// 60s cool-down; 3 retry attempts with exponential backoff from 100ms.
    pub fn build(self) -> ResilienceStack<E> {
        let breaker = self.breaker.unwrap_or_else(|| {
            CircuitBreaker::builder(self.name.clone())
                .max_requests(1)
                .timeout(Duration::from_secs(60))
                .ready_to_trip(failure_ratio_trip(3, 0.6))
                .build()
                .expect("default breaker configuration is valid")
        });
        let retry = self.retry.unwrap_or_else(|| RetryPolicy::builder().build());
        ResilienceStack { breaker, retry }
    }
}
