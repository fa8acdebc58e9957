//! In-process [`CoordinationStore`] for tests and single-node deployments.

use crate::clock::{Clock, MonotonicClock};
use crate::coordination::store::CoordinationStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    /// Clock millis after which the slot no longer exists.
    expires_at: Option<u64>,
}

/// Mutex-guarded map with per-key expiry.
///
/// Every trait method performs its whole compound check-and-act inside one
/// lock acquisition, giving the same atomicity a server-side script gives the
/// Redis backend. Expiry is evaluated lazily against the injected [`Clock`],
/// so tests drive windows and TTLs with a [`ManualClock`](crate::ManualClock).
///
/// Known divergence from Redis: counter operations on a key holding a
/// non-integer value (such as a lock token) read it as zero and overwrite it,
/// where Redis `INCRBY` returns a wrong-type error. Keep lock keys and
/// counter keys in separate namespaces, as the primitives here already do.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_clock(MonotonicClock::default())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self { clock: Arc::new(clock), slots: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drop the key if its expiry has passed, then return the live value.
    fn live<'a>(slots: &'a mut HashMap<String, Slot>, key: &str, now: u64) -> Option<&'a Slot> {
        let expired = slots
            .get(key)
            .and_then(|slot| slot.expires_at)
            .is_some_and(|deadline| now >= deadline);
        if expired {
            slots.remove(key);
        }
        slots.get(key)
    }

    fn live_count(slots: &mut HashMap<String, Slot>, key: &str, now: u64) -> i64 {
        Self::live(slots, key, now)
            .map(|slot| slot.value.parse::<i64>().unwrap_or(0))
            .unwrap_or(0)
    }
}

fn deadline(now: u64, ttl: Duration) -> u64 {
    now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    type Error = Infallible;

    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, Self::Error> {
        let mut slots = self.lock_slots();
        let now = self.clock.now_millis();
        if Self::live(&mut slots, key, now).is_some() {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot { value: token.to_string(), expires_at: Some(deadline(now, ttl)) },
        );
        Ok(true)
    }

    async fn release_if(&self, key: &str, token: &str) -> Result<bool, Self::Error> {
        let mut slots = self.lock_slots();
        let now = self.clock.now_millis();
        let owned = Self::live(&mut slots, key, now).is_some_and(|slot| slot.value == token);
        if owned {
            slots.remove(key);
        }
        Ok(owned)
    }

    async fn extend_if(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, Self::Error> {
        let mut slots = self.lock_slots();
        let now = self.clock.now_millis();
        let owned = Self::live(&mut slots, key, now).is_some_and(|slot| slot.value == token);
        if owned {
            if let Some(slot) = slots.get_mut(key) {
                slot.expires_at = Some(deadline(now, ttl));
            }
        }
        Ok(owned)
    }

    async fn try_consume(
        &self,
        key: &str,
        n: i64,
        limit: i64,
        window: Duration,
    ) -> Result<bool, Self::Error> {
        let mut slots = self.lock_slots();
        let now = self.clock.now_millis();
        let current = Self::live_count(&mut slots, key, now);
        if current + n > limit {
            return Ok(false);
        }
        if current == 0 {
            // First hit in a fresh window arms the expiry.
            slots.insert(
                key.to_string(),
                Slot { value: n.to_string(), expires_at: Some(deadline(now, window)) },
            );
        } else if let Some(slot) = slots.get_mut(key) {
            slot.value = (current + n).to_string();
        }
        Ok(true)
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64, Self::Error> {
        let mut slots = self.lock_slots();
        let now = self.clock.now_millis();
        let next = Self::live_count(&mut slots, key, now).saturating_add(delta);
        let expires_at = slots.get(key).and_then(|slot| slot.expires_at);
        slots.insert(key.to_string(), Slot { value: next.to_string(), expires_at });
        Ok(next)
    }

    async fn fetch(&self, key: &str) -> Result<i64, Self::Error> {
        let mut slots = self.lock_slots();
        let now = self.clock.now_millis();
        Ok(Self::live_count(&mut slots, key, now))
    }

    async fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.lock_slots().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn acquire_is_first_writer_wins() {
        let store = MemoryStore::new();
        assert!(store.acquire("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.acquire("k", "b", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn expired_key_can_be_reacquired() {
        let clock = ManualClock::new();
        let store = MemoryStore::with_clock(clock.clone());
        assert!(store.acquire("k", "a", Duration::from_secs(5)).await.unwrap());

        clock.advance(5_000);
        assert!(store.acquire("k", "b", Duration::from_secs(5)).await.unwrap());

        // The old owner's compare-and-delete is now a no-op.
        assert!(!store.release_if("k", "a").await.unwrap());
        assert_eq!(store.fetch("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn extend_requires_ownership() {
        let clock = ManualClock::new();
        let store = MemoryStore::with_clock(clock.clone());
        assert!(store.acquire("k", "a", Duration::from_secs(1)).await.unwrap());
        assert!(store.extend_if("k", "a", Duration::from_secs(10)).await.unwrap());
        assert!(!store.extend_if("k", "b", Duration::from_secs(10)).await.unwrap());

        // The extension kept the key alive past its original TTL.
        clock.advance(5_000);
        assert!(!store.acquire("k", "b", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn try_consume_enforces_the_limit_and_resets_with_the_window() {
        let clock = ManualClock::new();
        let store = MemoryStore::with_clock(clock.clone());
        let window = Duration::from_secs(60);

        for _ in 0..5 {
            assert!(store.try_consume("rl", 1, 5, window).await.unwrap());
        }
        assert!(!store.try_consume("rl", 1, 5, window).await.unwrap());

        // Denial must not consume: still denied, still full.
        assert!(!store.try_consume("rl", 1, 5, window).await.unwrap());

        clock.advance(60_000);
        assert!(store.try_consume("rl", 1, 5, window).await.unwrap());
    }

    #[tokio::test]
    async fn counter_on_a_non_integer_key_reads_zero_and_overwrites() {
        // Divergence from Redis INCRBY (which errors on a non-integer value);
        // documented on the type, pinned here.
        let store = MemoryStore::new();
        assert!(store.acquire("lock", "token-a", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.fetch("lock").await.unwrap(), 0);
        assert_eq!(store.add("lock", 2).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn counters_treat_absent_as_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.fetch("c").await.unwrap(), 0);
        assert_eq!(store.add("c", 3).await.unwrap(), 3);
        assert_eq!(store.add("c", -5).await.unwrap(), -2);
        store.remove("c").await.unwrap();
        assert_eq!(store.fetch("c").await.unwrap(), 0);
    }
}
