//! Abstract storage interface for coordination state.

use async_trait::async_trait;
use std::time::Duration;

/// Atomic key/value operations required by the coordination primitives.
///
/// Every method is a single compound check-and-act that the backend must
/// execute atomically with respect to all other callers; a naive
/// read-then-write split would race across processes. Correctness of the
/// lock, rate limiter, and counter is delegated entirely to this guarantee.
///
/// Keys carry either an opaque owner token (locks) or an integer rendered as
/// a string (counters, rate-limit windows), matching Redis string semantics.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Error type for storage operations (connectivity, protocol).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Set `key -> token` with `ttl` only if the key is absent
    /// (`SET key token NX EX ttl`). Returns true if this call took ownership.
    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, Self::Error>;

    /// Delete `key` only if its current value equals `token`. Returns true if
    /// the key was deleted, false if ownership had lapsed.
    async fn release_if(&self, key: &str, token: &str) -> Result<bool, Self::Error>;

    /// Re-arm `key`'s TTL only if its current value equals `token`. Returns
    /// true if the TTL was extended.
    async fn extend_if(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, Self::Error>;

    /// Fixed-window admission: if `current + n <= limit`, add `n` to the
    /// key's counter and return true, arming the key's expiry to `window`
    /// only when the counter starts from zero. Otherwise leave the counter
    /// untouched and return false.
    async fn try_consume(
        &self,
        key: &str,
        n: i64,
        limit: i64,
        window: Duration,
    ) -> Result<bool, Self::Error>;

    /// Add `delta` (may be negative) to the key's counter, treating an absent
    /// key as zero, and return the new value.
    async fn add(&self, key: &str, delta: i64) -> Result<i64, Self::Error>;

    /// Read the key's counter; absent keys read as zero.
    async fn fetch(&self, key: &str) -> Result<i64, Self::Error>;

    /// Delete the key. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), Self::Error>;
}
