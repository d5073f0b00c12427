//! Store Module
//!
//! The key-value capability the lock and the memoizing cache are built on,
//! with an in-memory backend and an optional Redis backend.

mod entry;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use entry::{StoreEntry, StoredValue};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

// == Lock Record Fields ==
/// Hash field holding the owner token of a lock record
pub const OWNER_FIELD: &str = "owner";

/// Hash field holding the reentrant hold count of a lock record
pub const HOLDS_FIELD: &str = "holds";

// == Key-Value Store ==
/// Remote key-value store with per-key expiration.
///
/// Plain verbs mirror the usual Redis commands. The three lock commands at the
/// bottom operate on a hash record made of [`OWNER_FIELD`] and [`HOLDS_FIELD`]
/// and must each execute as a single atomic operation on the store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the string stored at `key`, if any.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` at `key`, replacing any previous value. `None` means no expiration.
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    /// Removes `key`. Returns true if something was deleted.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Sets the time to live of an existing key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remaining time to live, or `None` when the key is absent or persistent.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Sets `field` only if it does not exist yet. Returns true if it was set.
    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> StoreResult<bool>;

    /// Adds `delta` to an integer field (missing fields count as 0) and returns the new value.
    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64>;

    /// Creates the lock record for `owner`, or increments its hold count when
    /// `owner` already holds it, resetting the TTL in both cases.
    ///
    /// Returns the new hold count, or `None` when another owner holds the record.
    async fn acquire_reentrant(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> StoreResult<Option<u64>>;

    /// Resets the TTL of the lock record if `owner` holds it.
    async fn renew_owned(&self, key: &str, owner: &str, ttl: Duration) -> StoreResult<bool>;

    /// Decrements the hold count if `owner` holds the record, deleting it at zero.
    ///
    /// Returns the remaining hold count, or `None` when `owner` does not hold it.
    async fn release_reentrant(&self, key: &str, owner: &str) -> StoreResult<Option<u64>>;
}
