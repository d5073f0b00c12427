//! Error types for the cache and lock
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Store Error Enum ==
/// Failures reported by a `KeyValueStore` backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A verb was applied to a key holding the wrong kind of value
    #[error("Wrong type for key: {0}")]
    WrongType(String),

    /// Hash increment on a field that does not hold an integer
    #[error("Hash field {field} of {key} is not an integer")]
    NotAnInteger { key: String, field: String },

    /// Error raised by the Redis client
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

// == Cache Error Enum ==
/// Unified error type for the memoizing cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid cache policy or call-site arguments
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The wrapped computation failed; nothing was cached
    #[error("Computation failed: {0}")]
    Compute(#[source] anyhow::Error),
}

// == Result Type Aliases ==
/// Convenience Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
