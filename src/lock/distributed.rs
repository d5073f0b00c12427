//! Distributed Lock Module
//!
//! Reentrant mutual exclusion keyed by a lock id. The lock record lives at
//! `<lockId>:lock` in the shared store and carries the owner token and a hold
//! count; every successful acquisition resets its TTL so a crashed holder's
//! lock expires on its own.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::lock::OwnerToken;
use crate::store::{KeyValueStore, HOLDS_FIELD, OWNER_FIELD};

/// Suffix appended to a lock id to form the record key
pub const LOCK_SUFFIX: &str = ":lock";

/// Backoff between attempts of `acquire_blocking`
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Hold time used by `lock` unless configured otherwise
const DEFAULT_HOLD: Duration = Duration::from_secs(180);

// == Distributed Lock ==
/// Reentrant lock whose state lives entirely in the store.
///
/// No in-process coordination is involved: clones, other tasks and other
/// processes sharing the store all contend on the same record.
pub struct DistributedLock<S: ?Sized> {
    store: Arc<S>,
    retry_interval: Duration,
    default_hold: Duration,
}

impl<S: ?Sized> Clone for DistributedLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            retry_interval: self.retry_interval,
            default_hold: self.default_hold,
        }
    }
}

impl<S: KeyValueStore + ?Sized> DistributedLock<S> {
    // == Constructor ==
    /// Creates a lock over `store` with the default retry interval.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            default_hold: DEFAULT_HOLD,
        }
    }

    /// Creates a lock using the retry interval and default hold from `config`.
    pub fn from_config(store: Arc<S>, config: &Config) -> Self {
        Self::new(store)
            .with_retry_interval(config.lock_retry_interval())
            .with_default_hold(config.default_lock_hold())
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_default_hold(mut self, hold: Duration) -> Self {
        self.default_hold = hold;
        self
    }

    /// Store key of the record for `lock_id`.
    pub fn lock_key(lock_id: &str) -> String {
        format!("{}{}", lock_id, LOCK_SUFFIX)
    }

    // == Acquire ==
    /// Tries to take the lock without waiting.
    ///
    /// Succeeds when the lock is free or already held by `owner` (reentrant
    /// acquisition). Either way the record's TTL is reset to `max_hold`.
    /// Returns false when another owner holds it.
    pub async fn acquire(
        &self,
        lock_id: &str,
        owner: &OwnerToken,
        max_hold: Duration,
    ) -> StoreResult<bool> {
        let key = Self::lock_key(lock_id);
        match self
            .store
            .acquire_reentrant(&key, owner.as_str(), max_hold)
            .await?
        {
            Some(1) => {
                info!("Acquired lock: {}", lock_id);
                Ok(true)
            }
            Some(holds) => {
                debug!("Re-entered lock {} (holds={})", lock_id, holds);
                Ok(true)
            }
            None => {
                debug!("Lock {} is held by another owner", lock_id);
                Ok(false)
            }
        }
    }

    /// Acquires with the configured default hold time.
    pub async fn lock(&self, lock_id: &str, owner: &OwnerToken) -> StoreResult<bool> {
        self.acquire(lock_id, owner, self.default_hold).await
    }

    // == Acquire Blocking ==
    /// Polls `acquire` every retry interval until it succeeds or `max_wait`
    /// elapses. Waiters are not queued, so there is no fairness between them.
    pub async fn acquire_blocking(
        &self,
        lock_id: &str,
        owner: &OwnerToken,
        max_wait: Duration,
        max_hold: Duration,
    ) -> StoreResult<bool> {
        let start = Instant::now();
        loop {
            if self.acquire(lock_id, owner, max_hold).await? {
                return Ok(true);
            }
            tokio::time::sleep(self.retry_interval).await;
            if start.elapsed() >= max_wait {
                debug!(
                    "Gave up on lock {} after {}ms",
                    lock_id,
                    start.elapsed().as_millis()
                );
                return Ok(false);
            }
        }
    }

    // == Renew ==
    /// Resets the TTL to `max_hold` if `owner` holds the lock.
    pub async fn renew(
        &self,
        lock_id: &str,
        owner: &OwnerToken,
        max_hold: Duration,
    ) -> StoreResult<bool> {
        let key = Self::lock_key(lock_id);
        self.store.renew_owned(&key, owner.as_str(), max_hold).await
    }

    // == Release ==
    /// Releases one hold of `owner`.
    ///
    /// Returns true when a hold was released, whether or not others remain;
    /// the record is deleted with the last hold. Returns false without
    /// touching the record when `owner` does not hold the lock.
    pub async fn release(&self, lock_id: &str, owner: &OwnerToken) -> StoreResult<bool> {
        let key = Self::lock_key(lock_id);
        match self.store.release_reentrant(&key, owner.as_str()).await? {
            Some(0) => {
                info!("Released lock: {}", lock_id);
                Ok(true)
            }
            Some(holds) => {
                debug!("Released one hold of lock {} ({} left)", lock_id, holds);
                Ok(true)
            }
            None => {
                debug!("Release of lock {} by non-owner {} ignored", lock_id, owner);
                Ok(false)
            }
        }
    }

    // == Inspection ==
    /// Number of outstanding holds, 0 when the lock is free.
    pub async fn hold_count(&self, lock_id: &str) -> StoreResult<u64> {
        let key = Self::lock_key(lock_id);
        match self.store.hash_get(&key, HOLDS_FIELD).await? {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|_| StoreError::NotAnInteger {
                key,
                field: HOLDS_FIELD.to_string(),
            }),
        }
    }

    /// Current holder of the lock, if any.
    pub async fn owner(&self, lock_id: &str) -> StoreResult<Option<OwnerToken>> {
        let key = Self::lock_key(lock_id);
        Ok(self
            .store
            .hash_get(&key, OWNER_FIELD)
            .await?
            .map(OwnerToken::new))
    }
}
