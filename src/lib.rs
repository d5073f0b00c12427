//! Stampede Cache - memoization with single-flight fills over a shared store
//!
//! Provides a reentrant distributed lock and a memoizing cache that uses it so
//! only one caller recomputes a missing entry while the others wait for it.

pub mod cache;
pub mod config;
pub mod error;
pub mod lock;
pub mod store;
pub mod tasks;

pub use cache::{CachePolicy, CachePolicyBuilder, CacheStats, Cached, KeyArg, MemoizingCache};
pub use config::Config;
pub use error::{CacheError, Result, StoreError, StoreResult};
pub use lock::{DistributedLock, OwnerToken};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{KeyValueStore, MemoryStore};
pub use tasks::spawn_cleanup_task;
