//! Cross-process coordination primitives built on a shared key/value store.
//!
//! The building blocks:
//! - [`CoordinationStore`]: the atomic-operation seam. Each method is one
//!   logical round trip that the backend must execute atomically; clients do
//!   no locking of their own.
//! - [`MemoryStore`]: in-process backend for tests and single-node use.
//! - [`DistributedLock`], [`RateLimiter`], [`DistributedCounter`]: primitives
//!   layered on the store.
//!
//! A Redis-backed store lives in the companion `breakwater-redis` crate.

pub mod counter;
pub mod lock;
pub mod memory;
pub mod rate_limit;
pub mod store;

pub use counter::DistributedCounter;
pub use lock::{DistributedLock, LockError};
pub use memory::MemoryStore;
pub use rate_limit::{RateLimiter, RateLimiterError};
pub use store::CoordinationStore;
