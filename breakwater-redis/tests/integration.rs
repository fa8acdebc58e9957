use breakwater::CoordinationStore;
use breakwater_redis::RedisStore;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Requires Redis running. If BREAKWATER_TEST_REDIS_URL is unset, the test skips.
#[tokio::test]
async fn atomic_operations_against_live_redis() {
    let url = match std::env::var("BREAKWATER_TEST_REDIS_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("skipping: set BREAKWATER_TEST_REDIS_URL (e.g. redis://127.0.0.1/)");
            return;
        }
    };
    let store = RedisStore::connect(&url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to redis at '{}': {}", url, e));

    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    let lock_key = format!("breakwater:test:{}:lock", nonce);
    let window_key = format!("breakwater:test:{}:window", nonce);
    let counter_key = format!("breakwater:test:{}:counter", nonce);
    let ttl = Duration::from_secs(5);

    // acquire is first-writer-wins
    assert!(store.acquire(&lock_key, "owner-a", ttl).await.unwrap());
    assert!(!store.acquire(&lock_key, "owner-b", ttl).await.unwrap());

    // only the current owner may extend or release
    assert!(store.extend_if(&lock_key, "owner-a", Duration::from_secs(10)).await.unwrap());
    assert!(!store.extend_if(&lock_key, "owner-b", ttl).await.unwrap());
    assert!(!store.release_if(&lock_key, "owner-b").await.unwrap());
    assert!(store.release_if(&lock_key, "owner-a").await.unwrap());
    assert!(store.acquire(&lock_key, "owner-b", ttl).await.unwrap());

    // fixed-window admission: exactly `limit` hits pass, denial consumes nothing
    let window = Duration::from_secs(60);
    for _ in 0..3 {
        assert!(store.try_consume(&window_key, 1, 3, window).await.unwrap());
    }
    assert!(!store.try_consume(&window_key, 1, 3, window).await.unwrap());
    assert!(!store.try_consume(&window_key, 1, 3, window).await.unwrap());

    // counters treat an absent key as zero
    assert_eq!(store.fetch(&counter_key).await.unwrap(), 0);
    assert_eq!(store.add(&counter_key, 3).await.unwrap(), 3);
    assert_eq!(store.add(&counter_key, -1).await.unwrap(), 2);
    assert_eq!(store.fetch(&counter_key).await.unwrap(), 2);

    // Cleanup
    for key in [lock_key, window_key, counter_key] {
        store.remove(&key).await.expect("cleanup failed");
    }
}
