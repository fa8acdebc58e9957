//! Store-backed distributed counter.

use crate::coordination::store::CoordinationStore;
use std::sync::Arc;

/// Counter whose state lives entirely in the store, making it trivially safe
/// across processes. An absent key reads as zero, never an error.
#[derive(Debug, Clone)]
pub struct DistributedCounter<S> {
    store: Arc<S>,
    key: String,
}

impl<S: CoordinationStore> DistributedCounter<S> {
    pub fn new(store: Arc<S>, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    /// Add `delta` and return the new value.
    pub async fn increment(&self, delta: i64) -> Result<i64, S::Error> {
        self.store.add(&self.key, delta).await
    }

    /// Subtract `delta` and return the new value.
    pub async fn decrement(&self, delta: i64) -> Result<i64, S::Error> {
        self.store.add(&self.key, delta.saturating_neg()).await
    }

    pub async fn get(&self) -> Result<i64, S::Error> {
        self.store.fetch(&self.key).await
    }

    pub async fn reset(&self) -> Result<(), S::Error> {
        self.store.remove(&self.key).await
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::memory::MemoryStore;

    #[tokio::test]
    async fn counts_across_handles() {
        let store = Arc::new(MemoryStore::new());
        let a = DistributedCounter::new(store.clone(), "jobs:active");
        let b = DistributedCounter::new(store, "jobs:active");

        assert_eq!(a.increment(1).await.unwrap(), 1);
        assert_eq!(b.increment(2).await.unwrap(), 3);
        assert_eq!(a.get().await.unwrap(), 3);
        assert_eq!(b.decrement(1).await.unwrap(), 2);

        a.reset().await.unwrap();
        assert_eq!(b.get().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn absent_key_reads_zero() {
        let store = Arc::new(MemoryStore::new());
        let counter = DistributedCounter::new(store, "never-written");
        assert_eq!(counter.get().await.unwrap(), 0);
        assert_eq!(counter.decrement(2).await.unwrap(), -2);
    }
}
