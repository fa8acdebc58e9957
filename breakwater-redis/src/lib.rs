#![forbid(unsafe_code)]
#![deny(warnings)]

//! Redis [`CoordinationStore`] for `breakwater`.
//!
//! Every compound check-and-act runs as a single server-side Lua script (or a
//! single `SET NX EX`), so atomicity across processes comes from Redis's
//! single-threaded script execution; the client never does read-then-write.
//!
//! Bring your own connection:
//!
//! ```rust,no_run
//! use breakwater::DistributedLock;
//! use breakwater_redis::RedisStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RedisStore::connect("redis://127.0.0.1/").await?);
//! let mut lock = DistributedLock::new(store, "job:42", Duration::from_secs(5));
//! if lock.acquire().await? {
//!     // critical section
//!     lock.release().await?;
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use breakwater::CoordinationStore;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use thiserror::Error;

/// Compare-and-delete: only the owner that wrote the token may remove it.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

/// Compare-and-expire: re-arm the TTL only while still the owner.
const EXTEND_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Fixed-window admission. The expiry is armed only on the zero->n
/// transition so the window is anchored at its first hit.
const CONSUME_SCRIPT: &str = r#"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
local n = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
if current + n <= limit then
  redis.call('INCRBY', KEYS[1], n)
  if current == 0 then
    redis.call('EXPIRE', KEYS[1], ARGV[3])
  end
  return 1
else
  return 0
end
"#;

/// Errors from the Redis backend.
#[derive(Debug, Error)]
pub enum RedisStoreError {
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
}

/// [`CoordinationStore`] backed by a shared Redis instance.
///
/// Holds a [`ConnectionManager`], which multiplexes and reconnects
/// internally; clones share the underlying connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").field("conn", &"<redis::aio::ConnectionManager>").finish()
    }
}

impl RedisStore {
    /// Wrap an existing connection manager.
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self, RedisStoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

/// Redis expiries are whole seconds; round up so a sub-second TTL never
/// becomes an immediately-expired key.
fn whole_seconds(d: Duration) -> u64 {
    let mut secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs = secs.saturating_add(1);
    }
    secs.max(1)
}

#[async_trait]
impl CoordinationStore for RedisStore {
    type Error = RedisStoreError;

    async fn acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, Self::Error> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(whole_seconds(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release_if(&self, key: &str, token: &str) -> Result<bool, Self::Error> {
        let mut conn = self.conn.clone();
        let deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn extend_if(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, Self::Error> {
        let mut conn = self.conn.clone();
        let extended: i64 = Script::new(EXTEND_SCRIPT)
            .key(key)
            .arg(token)
            .arg(whole_seconds(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn try_consume(
        &self,
        key: &str,
        n: i64,
        limit: i64,
        window: Duration,
    ) -> Result<bool, Self::Error> {
        let mut conn = self.conn.clone();
        let allowed: i64 = Script::new(CONSUME_SCRIPT)
            .key(key)
            .arg(n)
            .arg(limit)
            .arg(whole_seconds(window))
            .invoke_async(&mut conn)
            .await?;
        Ok(allowed == 1)
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64, Self::Error> {
        let mut conn = self.conn.clone();
        let value: i64 = redis::cmd("INCRBY").arg(key).arg(delta).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn fetch(&self, key: &str) -> Result<i64, Self::Error> {
        let mut conn = self.conn.clone();
        let value: Option<i64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value.unwrap_or(0))
    }

    async fn remove(&self, key: &str) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}
