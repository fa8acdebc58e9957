//! End-to-end composition: breaker + retry guarding a flaky dependency that
//! eventually recovers, using real time.

use breakwater::{
    failure_ratio_trip, Backoff, CircuitBreaker, NoopSleeper, ResilienceError, ResilienceStack,
    RetryPolicy, State,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
struct UpstreamError(&'static str);

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "upstream: {}", self.0)
    }
}

impl std::error::Error for UpstreamError {}

#[tokio::test]
async fn breaker_trips_cools_down_and_recovers() {
    let breaker = CircuitBreaker::builder("flaky-upstream")
        .max_requests(1)
        .timeout(Duration::from_millis(100))
        .ready_to_trip(failure_ratio_trip(3, 0.6))
        .build()
        .expect("valid breaker");
    let retry = RetryPolicy::builder()
        .max_attempts(2)
        .backoff(Backoff::constant(Duration::from_millis(1)))
        .with_sleeper(NoopSleeper)
        .build();
    let stack: ResilienceStack<UpstreamError> =
        ResilienceStack::builder("flaky-upstream").breaker(breaker).retry(retry).build();

    let healthy = Arc::new(AtomicBool::new(false));
    let invocations = Arc::new(AtomicUsize::new(0));

    let call = |healthy: Arc<AtomicBool>, invocations: Arc<AtomicUsize>| async move {
        invocations.fetch_add(1, Ordering::SeqCst);
        if healthy.load(Ordering::SeqCst) {
            Ok("response")
        } else {
            Err(ResilienceError::Inner(UpstreamError("connection reset")))
        }
    };

    // Three exhausted operations trip the reference policy.
    for _ in 0..3 {
        let result = stack
            .execute(|| call(healthy.clone(), invocations.clone()))
            .await;
        assert!(result.unwrap_err().is_retry_exhausted());
    }
    assert_eq!(stack.breaker().state(), State::Open);
    assert_eq!(invocations.load(Ordering::SeqCst), 6); // 3 operations * 2 attempts

    // While open, calls are rejected without touching the dependency.
    let rejected = stack.execute(|| call(healthy.clone(), invocations.clone())).await;
    assert!(rejected.unwrap_err().is_circuit_open());
    assert_eq!(invocations.load(Ordering::SeqCst), 6);

    // Dependency heals; after the cool-down, a trial call closes the circuit.
    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let recovered = stack.execute(|| call(healthy.clone(), invocations.clone())).await;
    assert_eq!(recovered.unwrap(), "response");
    assert_eq!(stack.breaker().state(), State::Closed);
}

#[tokio::test]
async fn half_open_failure_reopens_under_real_time() {
    let breaker = CircuitBreaker::builder("still-broken")
        .max_requests(1)
        .timeout(Duration::from_millis(50))
        .ready_to_trip(|counts| counts.consecutive_failures >= 1)
        .build()
        .expect("valid breaker");

    let fail = || async { Err::<(), _>(ResilienceError::Inner(UpstreamError("down"))) };

    assert!(breaker.execute(fail).await.is_err());
    assert_eq!(breaker.state(), State::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(breaker.state(), State::HalfOpen);

    // The trial fails: straight back to Open for another cool-down.
    assert!(breaker.execute(fail).await.is_err());
    assert_eq!(breaker.state(), State::Open);
}
