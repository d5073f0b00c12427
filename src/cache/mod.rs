//! Cache Module
//!
//! Stampede-protected memoization of expensive computations over a shared store.

mod key;
mod memoize;
mod policy;
mod stats;


// Re-export public types
pub use key::{build_cache_key, KeyArg, DEFAULT_KEY_PREFIX};
pub use memoize::{Cached, MemoizingCache, DEFAULT_FILL_POLL_ATTEMPTS, DEFAULT_FILL_POLL_INTERVAL};
pub use policy::{CachePolicy, CachePolicyBuilder, Transform, DEFAULT_EXPIRE, DEFAULT_MAX_LOCK_HOLD};
pub use stats::CacheStats;
