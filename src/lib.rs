#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Breakwater
//!
//! Resilience primitives that keep an unreliable downstream dependency from
//! causing cascading failure: an in-process circuit breaker, a retry executor
//! with exponential backoff, and cross-process coordination primitives
//! (distributed lock, fixed-window rate limiter, distributed counter) built
//! atop a shared key/value store.
//!
//! ## Quick start
//!
//! ```rust
//! use breakwater::{Backoff, CircuitBreaker, ResilienceError, RetryPolicy};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let breaker = CircuitBreaker::builder("orders-db")
//!         .timeout(Duration::from_secs(30))
//!         .build()
//!         .unwrap();
//!     let retry = RetryPolicy::builder()
//!         .max_attempts(3)
//!         .backoff(Backoff::exponential(Duration::from_millis(100)))
//!         .build();
//!
//!     // Breaker outermost, retries inside a single admission.
//!     let result = breaker
//!         .execute(|| async {
//!             retry
//!                 .execute(|| async {
//!                     // the real remote call goes here
//!                     Ok::<_, ResilienceError<std::io::Error>>(())
//!                 })
//!                 .await
//!         })
//!         .await;
//!     assert!(result.is_ok());
//! }
//! ```
//!
//! ## Coordination
//!
//! [`DistributedLock`], [`RateLimiter`], and [`DistributedCounter`] delegate
//! atomicity to a [`CoordinationStore`]. [`MemoryStore`] serves tests and
//! single-node deployments; the `breakwater-redis` companion crate provides
//! the Redis backend.

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod coordination;
pub mod error;
pub mod jitter;
pub mod retry;
pub mod sleeper;
pub mod stack;

// Re-exports
pub use backoff::{Backoff, BackoffError, MAX_DELAY};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, Counts, State};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use coordination::{
    CoordinationStore, DistributedCounter, DistributedLock, LockError, MemoryStore, RateLimiter,
    RateLimiterError,
};
pub use error::ResilienceError;
pub use jitter::Jitter;
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{NoopSleeper, RecordingSleeper, Sleeper, TokioSleeper};
pub use stack::{failure_ratio_trip, ResilienceStack, ResilienceStackBuilder};
