//! Store-backed fixed-window rate limiter.
//!
//! Counting is fixed-window, not sliding or token-bucket: the first hit on a
//! key arms a window-long expiry, subsequent hits increment until `limit`,
//! and the counter vanishes when the window expires. A caller can therefore
//! get up to `2 * limit` requests through straddling a window boundary; that
//! coarseness is a known property of fixed windows.

use crate::coordination::store::CoordinationStore;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from rate limiter construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimiterError {
    #[error("prefix cannot be empty")]
    EmptyPrefix,
    #[error("prefix cannot contain control characters")]
    InvalidPrefix,
}

/// Admission control over keys under a shared namespace prefix.
///
/// All state lives in the store under `prefix:key`; the limiter itself is
/// stateless and freely shareable. Checks are non-blocking: a denied request
/// gets `false` back, never a wait.
#[derive(Debug, Clone)]
pub struct RateLimiter<S> {
    store: Arc<S>,
    prefix: String,
}

impl<S: CoordinationStore> RateLimiter<S> {
    /// Create a limiter namespacing its keys under `prefix`.
    pub fn new(store: Arc<S>, prefix: impl Into<String>) -> Result<Self, RateLimiterError> {
        let prefix: String = prefix.into();
        let prefix = prefix.trim().trim_end_matches(':').to_string();
        if prefix.is_empty() {
            return Err(RateLimiterError::EmptyPrefix);
        }
        if prefix.chars().any(|c| c.is_control()) {
            return Err(RateLimiterError::InvalidPrefix);
        }
        Ok(Self { store, prefix })
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Admit one request for `key` under `limit` per `window`.
    pub async fn allow(
        &self,
        key: &str,
        limit: i64,
        window: Duration,
    ) -> Result<bool, S::Error> {
        self.allow_n(key, 1, limit, window).await
    }

    /// Admit `n` requests at once; all-or-nothing against the window budget.
    pub async fn allow_n(
        &self,
        key: &str,
        n: i64,
        limit: i64,
        window: Duration,
    ) -> Result<bool, S::Error> {
        self.store.try_consume(&self.scoped(key), n, limit, window).await
    }

    /// `allow`, but a store failure admits the request instead of blocking
    /// all traffic on a degraded coordination store. Failing open is a policy
    /// decision: use this variant only where over-admission is safer than an
    /// outage, and keep `allow` where the limit is a hard guarantee.
    pub async fn allow_or_fail_open(&self, key: &str, limit: i64, window: Duration) -> bool {
        match self.allow(key, limit, window).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    key = %self.scoped(key),
                    error = %e,
                    "rate limit store unavailable; failing open"
                );
                true
            }
        }
    }

    /// Clear `key`'s current window.
    pub async fn reset(&self, key: &str) -> Result<(), S::Error> {
        self.store.remove(&self.scoped(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::coordination::memory::MemoryStore;

    fn limiter(clock: ManualClock) -> RateLimiter<MemoryStore> {
        RateLimiter::new(Arc::new(MemoryStore::with_clock(clock)), "ratelimit").unwrap()
    }

    #[test]
    fn prefix_is_validated() {
        let store = Arc::new(MemoryStore::new());
        assert_eq!(
            RateLimiter::new(store.clone(), "  ").unwrap_err(),
            RateLimiterError::EmptyPrefix
        );
        assert_eq!(
            RateLimiter::new(store, "bad\nprefix").unwrap_err(),
            RateLimiterError::InvalidPrefix
        );
    }

    #[tokio::test]
    async fn exactly_limit_requests_pass_per_window() {
        let clock = ManualClock::new();
        let rl = limiter(clock.clone());
        let window = Duration::from_secs(60);

        for _ in 0..5 {
            assert!(rl.allow("user:1", 5, window).await.unwrap());
        }
        assert!(!rl.allow("user:1", 5, window).await.unwrap());

        // Window elapses; the same key is admitted again.
        clock.advance(60_000);
        assert!(rl.allow("user:1", 5, window).await.unwrap());
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let clock = ManualClock::new();
        let rl = limiter(clock);
        let window = Duration::from_secs(60);

        assert!(rl.allow("a", 1, window).await.unwrap());
        assert!(!rl.allow("a", 1, window).await.unwrap());
        assert!(rl.allow("b", 1, window).await.unwrap());
    }

    #[tokio::test]
    async fn allow_n_is_all_or_nothing() {
        let clock = ManualClock::new();
        let rl = limiter(clock);
        let window = Duration::from_secs(60);

        assert!(rl.allow_n("batch", 4, 5, window).await.unwrap());
        // 2 more would exceed the budget of 5; nothing is consumed.
        assert!(!rl.allow_n("batch", 2, 5, window).await.unwrap());
        assert!(rl.allow_n("batch", 1, 5, window).await.unwrap());
    }

    #[tokio::test]
    async fn reset_clears_the_window() {
        let clock = ManualClock::new();
        let rl = limiter(clock);
        let window = Duration::from_secs(60);

        assert!(rl.allow("k", 1, window).await.unwrap());
        assert!(!rl.allow("k", 1, window).await.unwrap());
        rl.reset("k").await.unwrap();
        assert!(rl.allow("k", 1, window).await.unwrap());
    }
}
