//! Memory Store Module
//!
//! In-process `KeyValueStore` holding string and hash entries with TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::{KeyValueStore, StoreEntry, StoredValue, HOLDS_FIELD, OWNER_FIELD};

// == Memory Store ==
/// Shared in-memory store.
///
/// Clones share the same map, so several clones behave like several clients
/// of one server. Every operation runs under a single write lock, which makes
/// the compound lock commands atomic.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, StoreEntry>>>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the store.
    ///
    /// Returns the number of entries removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    // == Length ==
    /// Returns the number of entries, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    // == Is Empty ==
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

// == Entry Helpers ==
/// Returns the live entry for `key`, purging it first if it has expired.
fn live_entry<'a>(
    entries: &'a mut HashMap<String, StoreEntry>,
    key: &str,
) -> Option<&'a mut StoreEntry> {
    if entries.get(key).is_some_and(StoreEntry::is_expired) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn live_hash<'a>(
    entries: &'a mut HashMap<String, StoreEntry>,
    key: &str,
) -> StoreResult<Option<&'a mut HashMap<String, String>>> {
    match live_entry(entries, key) {
        None => Ok(None),
        Some(entry) => match &mut entry.value {
            StoredValue::Hash(hash) => Ok(Some(hash)),
            StoredValue::String(_) => Err(StoreError::WrongType(key.to_string())),
        },
    }
}

fn increment_field(
    key: &str,
    hash: &mut HashMap<String, String>,
    field: &str,
    delta: i64,
) -> StoreResult<i64> {
    let current = match hash.get(field) {
        Some(raw) => raw.parse::<i64>().map_err(|_| StoreError::NotAnInteger {
            key: key.to_string(),
            field: field.to_string(),
        })?,
        None => 0,
    };
    let updated = current.saturating_add(delta);
    hash.insert(field.to_string(), updated.to_string());
    Ok(updated)
}

/// Whether the lock record at `key` is held by `owner`.
/// `None` when there is no record or it carries no owner.
fn held_by(
    entries: &mut HashMap<String, StoreEntry>,
    key: &str,
    owner: &str,
) -> StoreResult<Option<bool>> {
    Ok(live_hash(entries, key)?
        .and_then(|hash| hash.get(OWNER_FIELD))
        .map(|current| current == owner))
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            None => Ok(None),
            Some(entry) => match &entry.value {
                StoredValue::String(value) => Ok(Some(value.clone())),
                StoredValue::Hash(_) => Err(StoreError::WrongType(key.to_string())),
            },
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = StoreEntry::new(StoredValue::String(value), ttl);
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        if live_entry(&mut entries, key).is_none() {
            return Ok(false);
        }
        Ok(entries.remove(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        match live_entry(&mut entries, key) {
            Some(entry) => {
                entry.expire_in(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut entries = self.entries.write().await;
        Ok(live_entry(&mut entries, key).and_then(|entry| entry.ttl_remaining()))
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.write().await;
        Ok(live_hash(&mut entries, key)?.and_then(|hash| hash.get(field).cloned()))
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        if let Some(hash) = live_hash(&mut entries, key)? {
            if hash.contains_key(field) {
                return Ok(false);
            }
            hash.insert(field.to_string(), value.to_string());
            return Ok(true);
        }

        let hash = HashMap::from([(field.to_string(), value.to_string())]);
        entries.insert(key.to_string(), StoreEntry::new(StoredValue::Hash(hash), None));
        Ok(true)
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut entries = self.entries.write().await;
        if let Some(hash) = live_hash(&mut entries, key)? {
            return increment_field(key, hash, field, delta);
        }

        let hash = HashMap::from([(field.to_string(), delta.to_string())]);
        entries.insert(key.to_string(), StoreEntry::new(StoredValue::Hash(hash), None));
        Ok(delta)
    }

    async fn acquire_reentrant(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> StoreResult<Option<u64>> {
        let mut entries = self.entries.write().await;
        match held_by(&mut entries, key, owner)? {
            Some(false) => Ok(None),
            Some(true) => {
                let Some(entry) = live_entry(&mut entries, key) else {
                    return Ok(None);
                };
                let StoredValue::Hash(hash) = &mut entry.value else {
                    return Err(StoreError::WrongType(key.to_string()));
                };
                let holds = increment_field(key, hash, HOLDS_FIELD, 1)?;
                entry.expire_in(ttl);
                Ok(Some(holds.max(0) as u64))
            }
            None => {
                let hash = HashMap::from([
                    (OWNER_FIELD.to_string(), owner.to_string()),
                    (HOLDS_FIELD.to_string(), "1".to_string()),
                ]);
                entries.insert(
                    key.to_string(),
                    StoreEntry::new(StoredValue::Hash(hash), Some(ttl)),
                );
                Ok(Some(1))
            }
        }
    }

    async fn renew_owned(&self, key: &str, owner: &str, ttl: Duration) -> StoreResult<bool> {
        let mut entries = self.entries.write().await;
        if held_by(&mut entries, key, owner)? != Some(true) {
            return Ok(false);
        }
        match live_entry(&mut entries, key) {
            Some(entry) => {
                entry.expire_in(ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_reentrant(&self, key: &str, owner: &str) -> StoreResult<Option<u64>> {
        let mut entries = self.entries.write().await;
        if held_by(&mut entries, key, owner)? != Some(true) {
            return Ok(None);
        }
        let remaining = match live_hash(&mut entries, key)? {
            Some(hash) => increment_field(key, hash, HOLDS_FIELD, -1)?,
            None => return Ok(None),
        };
        if remaining <= 0 {
            entries.remove(key);
            return Ok(Some(0));
        }
        Ok(Some(remaining as u64))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_store_new() {
        let store = MemoryStore::new();
        assert_eq!(store.len().await, 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_store_set_and_get() {
        let store = MemoryStore::new();

        store.set("key1", "value1".to_string(), None).await.unwrap();

        assert_eq!(store.get("key1").await.unwrap(), Some("value1".to_string()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_store_get_nonexistent() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_overwrite_resets_ttl() {
        let store = MemoryStore::new();

        store
            .set("key1", "value1".to_string(), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        store.set("key1", "value2".to_string(), None).await.unwrap();

        assert_eq!(store.get("key1").await.unwrap(), Some("value2".to_string()));
        assert_eq!(store.ttl("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_delete() {
        let store = MemoryStore::new();

        store.set("key1", "value1".to_string(), None).await.unwrap();

        assert!(store.delete("key1").await.unwrap());
        assert!(!store.delete("key1").await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_ttl_expiration() {
        let store = MemoryStore::new();

        store
            .set("key1", "value1".to_string(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(store.get("key1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert_eq!(store.get("key1").await.unwrap(), None);
        assert_eq!(store.ttl("key1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_expire_existing_and_missing() {
        let store = MemoryStore::new();
        store.set("key1", "value1".to_string(), None).await.unwrap();

        assert!(store.expire("key1", Duration::from_millis(750)).await.unwrap());
        assert!(!store.expire("missing", Duration::from_millis(750)).await.unwrap());
        assert_eq!(
            store.ttl("key1").await.unwrap(),
            Some(Duration::from_millis(750))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_cleanup_expired() {
        let store = MemoryStore::new();

        store
            .set("key1", "value1".to_string(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store
            .set("key2", "value2".to_string(), Some(Duration::from_secs(10)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get("key2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_hash_set_if_absent_and_get() {
        let store = MemoryStore::new();

        assert!(store.hash_set_if_absent("h", "f", "one").await.unwrap());
        assert!(!store.hash_set_if_absent("h", "f", "two").await.unwrap());

        assert_eq!(store.hash_get("h", "f").await.unwrap(), Some("one".to_string()));
        assert_eq!(store.hash_get("h", "other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_hash_increment() {
        let store = MemoryStore::new();

        assert_eq!(store.hash_increment("h", "n", 3).await.unwrap(), 3);
        assert_eq!(store.hash_increment("h", "n", -5).await.unwrap(), -2);

        store.hash_set_if_absent("h", "text", "abc").await.unwrap();
        let err = assert_err!(store.hash_increment("h", "text", 1).await);
        assert!(matches!(err, StoreError::NotAnInteger { .. }));
    }

    #[tokio::test]
    async fn test_wrong_type_errors() {
        let store = MemoryStore::new();
        store.set("plain", "value".to_string(), None).await.unwrap();
        store.hash_set_if_absent("hash", "f", "v").await.unwrap();

        assert!(matches!(
            store.hash_get("plain", "f").await,
            Err(StoreError::WrongType(_))
        ));
        assert!(matches!(store.get("hash").await, Err(StoreError::WrongType(_))));
    }

    #[tokio::test]
    async fn test_acquire_reentrant_counts_holds() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);

        assert_eq!(assert_ok!(store.acquire_reentrant("l", "a", ttl).await), Some(1));
        assert_eq!(assert_ok!(store.acquire_reentrant("l", "a", ttl).await), Some(2));
        assert_eq!(assert_ok!(store.acquire_reentrant("l", "b", ttl).await), None);
        assert_eq!(store.hash_get("l", HOLDS_FIELD).await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn test_release_reentrant_deletes_at_zero() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);
        store.acquire_reentrant("l", "a", ttl).await.unwrap();
        store.acquire_reentrant("l", "a", ttl).await.unwrap();

        assert_eq!(store.release_reentrant("l", "b").await.unwrap(), None);
        assert_eq!(store.release_reentrant("l", "a").await.unwrap(), Some(1));
        assert_eq!(store.release_reentrant("l", "a").await.unwrap(), Some(0));
        assert!(store.is_empty().await);
        assert_eq!(store.release_reentrant("l", "a").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_owned_only_for_owner() {
        let store = MemoryStore::new();
        store
            .acquire_reentrant("l", "a", Duration::from_secs(1))
            .await
            .unwrap();

        assert!(!store.renew_owned("l", "b", Duration::from_secs(9)).await.unwrap());
        assert!(store.renew_owned("l", "a", Duration::from_secs(9)).await.unwrap());
        assert_eq!(store.ttl("l").await.unwrap(), Some(Duration::from_secs(9)));
    }

    #[tokio::test]
    async fn test_acquire_reentrant_on_string_key_fails() {
        let store = MemoryStore::new();
        store.set("l", "value".to_string(), None).await.unwrap();

        let result = store.acquire_reentrant("l", "a", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(StoreError::WrongType(_))));
    }
}
