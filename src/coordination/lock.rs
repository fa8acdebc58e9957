//! Distributed mutual-exclusion lock with a fencing token.

use crate::coordination::store::CoordinationStore;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors from lock operations.
#[derive(Debug, Error)]
pub enum LockError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// `extend` was called on a lock this instance never acquired.
    #[error("lock '{key}' was never acquired by this instance")]
    NotAcquired { key: String },
    /// The underlying store call failed.
    #[error("coordination store error: {0}")]
    Store(#[from] E),
}

/// One critical-section attempt on a store-backed lock.
///
/// Instances are created per attempt and discarded after release. The fencing
/// token is unique per instance, so a holder whose TTL lapsed can never
/// delete or extend a key re-acquired by a different owner: the store
/// compares the stored value to this token atomically on every mutation.
///
/// At most one instance holds a given key at any instant; that invariant is
/// enforced purely by the store's atomic set-if-absent, not by any
/// client-side coordination.
#[derive(Debug)]
pub struct DistributedLock<S: CoordinationStore> {
    store: Arc<S>,
    key: String,
    token: String,
    ttl: Duration,
    acquired: bool,
}

impl<S: CoordinationStore> DistributedLock<S> {
    /// Create a lock handle for `key` with the given TTL. Nothing is acquired
    /// until [`acquire`](Self::acquire) succeeds.
    pub fn new(store: Arc<S>, key: impl Into<String>, ttl: Duration) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let token = format!("{:x}-{:016x}", nanos, rand::rng().random::<u64>());
        Self { store, key: key.into(), token, ttl, acquired: false }
    }

    /// Try to take the lock. `Ok(false)` means another holder owns it, an
    /// expected outcome rather than a failure.
    pub async fn acquire(&mut self) -> Result<bool, LockError<S::Error>> {
        let acquired = self.store.acquire(&self.key, &self.token, self.ttl).await?;
        self.acquired = acquired;
        if acquired {
            tracing::debug!(key = %self.key, ttl_ms = self.ttl.as_millis() as u64, "lock acquired");
        }
        Ok(acquired)
    }

    /// Release the lock. If the TTL already lapsed and another owner took the
    /// key, this is a safe no-op; the compare-and-delete never removes
    /// someone else's lock. Releasing a lock that was never acquired is also
    /// a no-op.
    pub async fn release(&mut self) -> Result<(), LockError<S::Error>> {
        if !self.acquired {
            return Ok(());
        }
        let deleted = self.store.release_if(&self.key, &self.token).await?;
        self.acquired = false;
        if !deleted {
            tracing::warn!(key = %self.key, "lock lapsed before release; no-op");
        }
        Ok(())
    }

    /// Extend the TTL if this instance still owns the key. Returns `Ok(false)`
    /// (and marks the lock lost) if ownership lapsed; errs if this instance
    /// never acquired the lock at all.
    pub async fn extend(&mut self, ttl: Duration) -> Result<bool, LockError<S::Error>> {
        if !self.acquired {
            return Err(LockError::NotAcquired { key: self.key.clone() });
        }
        let extended = self.store.extend_if(&self.key, &self.token, ttl).await?;
        if extended {
            self.ttl = ttl;
        } else {
            self.acquired = false;
        }
        Ok(extended)
    }

    /// Whether this instance currently believes it holds the lock.
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// The fencing token written under the key while held.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
