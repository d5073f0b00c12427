//! Memoizing Cache Module
//!
//! Cache-aside wrapper around an expensive computation with single-flight
//! fill protection: on a miss one owner takes the fill lock for the cache key
//! and computes, while other callers poll the store for the published result.

use std::future::Future;
use std::panic::{AssertUnwindSafe, Location};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::key::{build_cache_key, default_template, KeyArg};
use crate::cache::stats::StatsRecorder;
use crate::cache::{CachePolicy, CacheStats};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::lock::{DistributedLock, OwnerToken};
use crate::store::KeyValueStore;

/// Default interval between reads while waiting for another owner's fill
pub const DEFAULT_FILL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default number of reads before a fill-waiter gives up
pub const DEFAULT_FILL_POLL_ATTEMPTS: u32 = 20;

// == Cached ==
/// Outcome of a cache invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cached<V> {
    /// A value, either cached or freshly computed
    Value(V),
    /// The computation produced no value, now or on an earlier fill
    Null,
    /// No value became available within the fill-wait budget
    Miss,
}

impl<V> Cached<V> {
    /// Collapses `Null` and `Miss` into `None`.
    pub fn into_option(self) -> Option<V> {
        match self {
            Cached::Value(value) => Some(value),
            Cached::Null | Cached::Miss => None,
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Cached::Miss)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cached::Null)
    }
}

// == Memoizing Cache ==
/// Stampede-protected memoizing cache over a shared store.
///
/// All coordination state lives in the store; clones share it and their
/// statistics.
pub struct MemoizingCache<S: ?Sized> {
    store: Arc<S>,
    lock: DistributedLock<S>,
    fill_poll_interval: Duration,
    fill_poll_attempts: u32,
    stats: Arc<StatsRecorder>,
}

impl<S: ?Sized> Clone for MemoizingCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lock: self.lock.clone(),
            fill_poll_interval: self.fill_poll_interval,
            fill_poll_attempts: self.fill_poll_attempts,
            stats: Arc::clone(&self.stats),
        }
    }
}

fn elapsed_ms(start: Instant) -> u128 {
    start.elapsed().as_millis()
}

impl<S: KeyValueStore + ?Sized> MemoizingCache<S> {
    // == Constructor ==
    /// Creates a cache over `store` with default lock and fill-wait tuning.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            lock: DistributedLock::new(Arc::clone(&store)),
            store,
            fill_poll_interval: DEFAULT_FILL_POLL_INTERVAL,
            fill_poll_attempts: DEFAULT_FILL_POLL_ATTEMPTS,
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    /// Creates a cache using the lock and fill-wait tuning from `config`.
    pub fn from_config(store: Arc<S>, config: &Config) -> Self {
        Self {
            lock: DistributedLock::from_config(Arc::clone(&store), config),
            ..Self::new(store)
        }
        .with_fill_polling(config.fill_poll_interval(), config.fill_poll_attempts)
    }

    pub fn with_fill_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.fill_poll_interval = interval;
        self.fill_poll_attempts = attempts;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The lock guarding fills; its ids are the cache keys.
    pub fn lock(&self) -> &DistributedLock<S> {
        &self.lock
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    // == Cache Key ==
    /// Key under which `policy` caches a call with `args`.
    ///
    /// Requires a configured key template, since the default one is derived
    /// from the location of the `invoke` call.
    pub fn cache_key<V>(&self, policy: &CachePolicy<V>, args: &[&dyn KeyArg]) -> Result<String> {
        if policy.key_template().is_empty() {
            return Err(CacheError::Config(
                "cache key requires a configured key template".to_string(),
            ));
        }
        build_cache_key(policy.key_template(), policy.param_indices(), args)
    }

    // == Evict ==
    /// Removes the cached entry for a call. Returns true if one existed.
    pub async fn evict<V>(&self, policy: &CachePolicy<V>, args: &[&dyn KeyArg]) -> Result<bool> {
        let cache_key = self.cache_key(policy, args)?;
        Ok(self.store.delete(&cache_key).await?)
    }

    // == Invoke ==
    /// Returns the cached result of `compute` for these arguments, computing
    /// and publishing it on a miss.
    ///
    /// Each call acts as its own lock owner. Use [`invoke_as`](Self::invoke_as)
    /// to share an owner across nested calls. Without a key template the key
    /// is derived from the source location of this call.
    #[track_caller]
    pub fn invoke<'a, V, F, Fut>(
        &'a self,
        policy: &'a CachePolicy<V>,
        args: &'a [&'a dyn KeyArg],
        compute: F,
    ) -> impl Future<Output = Result<Cached<V>>> + 'a
    where
        S: 'a,
        V: Serialize + DeserializeOwned + 'a,
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = anyhow::Result<Option<V>>> + 'a,
    {
        let caller = Location::caller();
        async move {
            let owner = OwnerToken::generate();
            self.run(&owner, policy, args, compute, caller).await
        }
    }

    /// Like [`invoke`](Self::invoke), with an explicit lock owner.
    ///
    /// # Errors
    /// - `CacheError::Store` when the store fails
    /// - `CacheError::Compute` when `compute` fails; the fill lock is released
    ///   first and nothing is cached
    /// - `CacheError::Config` when a parameter index has no argument
    ///
    /// Running out of fill-wait attempts is not an error: it yields `Cached::Miss`.
    #[track_caller]
    pub fn invoke_as<'a, V, F, Fut>(
        &'a self,
        owner: &'a OwnerToken,
        policy: &'a CachePolicy<V>,
        args: &'a [&'a dyn KeyArg],
        compute: F,
    ) -> impl Future<Output = Result<Cached<V>>> + 'a
    where
        S: 'a,
        V: Serialize + DeserializeOwned + 'a,
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = anyhow::Result<Option<V>>> + 'a,
    {
        self.run(owner, policy, args, compute, Location::caller())
    }

    async fn run<V, F, Fut>(
        &self,
        owner: &OwnerToken,
        policy: &CachePolicy<V>,
        args: &[&dyn KeyArg],
        compute: F,
        caller: &'static Location<'static>,
    ) -> Result<Cached<V>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<V>>>,
    {
        let start = Instant::now();
        let template = if policy.key_template().is_empty() {
            default_template(caller)
        } else {
            policy.key_template().to_string()
        };
        let cache_key = build_cache_key(&template, policy.param_indices(), args)?;
        debug!("{} - cache key: {}", template, cache_key);

        if let Some(raw) = self.store.get(&cache_key).await? {
            self.stats.record_hit();
            debug!("{} - use cache, used time {}ms", cache_key, elapsed_ms(start));
            return Ok(self.read_cached(policy, &cache_key, raw));
        }
        self.stats.record_miss();

        if !policy.stampede_protection() {
            let result = self.fill(policy, &cache_key, compute).await?;
            info!(
                "{} - save cache no lock, used time {}ms",
                cache_key,
                elapsed_ms(start)
            );
            return Ok(result);
        }

        if !self
            .lock
            .acquire(&cache_key, owner, policy.max_lock_hold())
            .await?
        {
            return self.wait_for_fill(policy, &cache_key, start).await;
        }

        // The lock is released on every exit path, panics included.
        let outcome = AssertUnwindSafe(self.fill_locked(policy, &cache_key, compute))
            .catch_unwind()
            .await;
        match self.lock.release(&cache_key, owner).await {
            Ok(true) => {}
            Ok(false) => warn!("{} - unlock failed, lock no longer held", cache_key),
            Err(e) => warn!("{} - unlock failed: {}", cache_key, e),
        }
        let result = match outcome {
            Ok(result) => result?,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        info!(
            "{} - save cache has lock, used time {}ms",
            cache_key,
            elapsed_ms(start)
        );
        Ok(result)
    }

    // == Fill ==
    /// Fill performed while holding the lock. Re-reads the key first: a fill
    /// that landed between our miss and our acquisition is not recomputed.
    async fn fill_locked<V, F, Fut>(
        &self,
        policy: &CachePolicy<V>,
        cache_key: &str,
        compute: F,
    ) -> Result<Cached<V>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<V>>>,
    {
        if let Some(raw) = self.store.get(cache_key).await? {
            self.stats.record_wait_hit();
            debug!("{} - filled by previous owner", cache_key);
            return Ok(self.read_cached(policy, cache_key, raw));
        }
        self.fill(policy, cache_key, compute).await
    }

    async fn fill<V, F, Fut>(
        &self,
        policy: &CachePolicy<V>,
        cache_key: &str,
        compute: F,
    ) -> Result<Cached<V>>
    where
        V: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Option<V>>>,
    {
        let computed = compute().await.map_err(|e| {
            warn!("{} - computation failed: {:#}", cache_key, e);
            CacheError::Compute(e)
        })?;
        let ttl = policy.effective_ttl();

        let Some(value) = computed else {
            self.store
                .set(cache_key, policy.null_sentinel().to_string(), ttl)
                .await?;
            self.stats.record_fill(true);
            return Ok(Cached::Null);
        };

        match serde_json::to_string(&value) {
            Ok(payload) => {
                self.store.set(cache_key, payload, ttl).await?;
                self.stats.record_fill(false);
            }
            Err(e) => warn!(
                "{} - result not serializable, returned uncached: {}",
                cache_key, e
            ),
        }
        Ok(Cached::Value(value))
    }

    // == Wait For Fill ==
    /// Polls the store while another owner fills the key.
    async fn wait_for_fill<V>(
        &self,
        policy: &CachePolicy<V>,
        cache_key: &str,
        start: Instant,
    ) -> Result<Cached<V>>
    where
        V: DeserializeOwned,
    {
        debug!("{} - lock held by another owner, waiting for fill", cache_key);
        for _ in 0..self.fill_poll_attempts {
            tokio::time::sleep(self.fill_poll_interval).await;
            if let Some(raw) = self.store.get(cache_key).await? {
                self.stats.record_wait_hit();
                info!(
                    "{} - wait cache success, used time {}ms",
                    cache_key,
                    elapsed_ms(start)
                );
                return Ok(self.read_cached(policy, cache_key, raw));
            }
        }

        self.stats.record_wait_timeout();
        warn!(
            "{} - wait cache failed, used time {}ms",
            cache_key,
            elapsed_ms(start)
        );
        Ok(Cached::Miss)
    }

    // == Read Cached ==
    /// Decodes a stored payload and applies the post-hit transform.
    fn read_cached<V>(&self, policy: &CachePolicy<V>, cache_key: &str, raw: String) -> Cached<V>
    where
        V: DeserializeOwned,
    {
        if raw == policy.null_sentinel() {
            return Cached::Null;
        }
        let value: V = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("{} - cached value could not be decoded: {}", cache_key, e);
                return Cached::Miss;
            }
        };

        let Some(callback) = policy.callback() else {
            return Cached::Value(value);
        };
        match callback(&value) {
            Ok(transformed) => Cached::Value(transformed),
            Err(e) => {
                warn!("{} - callback failed: {:#}", cache_key, e);
                self.stats.record_callback_failure();
                Cached::Value(value)
            }
        }
    }
}
