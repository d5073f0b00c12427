//! Cache Policy Module
//!
//! Per-call-site configuration of the memoizing cache.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::{CacheError, Result};

/// Default base expiration (30 s)
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(30);

/// Default maximum hold time of the fill lock (30 min)
pub const DEFAULT_MAX_LOCK_HOLD: Duration = Duration::from_millis(1_800_000);

/// Post-hit transform applied to cached values.
pub type Transform<V> = Arc<dyn Fn(&V) -> anyhow::Result<V> + Send + Sync>;

// == Cache Policy ==
/// Immutable configuration for one cached computation.
///
/// Built and validated through [`CachePolicy::builder`]; an instance always
/// has ordered jitter bounds, a non-zero lock hold and a null sentinel that
/// no JSON payload can equal.
pub struct CachePolicy<V> {
    key_template: String,
    param_indices: Vec<usize>,
    base_expire: Duration,
    jitter: (Duration, Duration),
    callback: Option<Transform<V>>,
    null_sentinel: String,
    stampede_protection: bool,
    max_lock_hold: Duration,
}

impl<V> CachePolicy<V> {
    pub fn builder() -> CachePolicyBuilder<V> {
        CachePolicyBuilder::default()
    }

    /// Configured key template; empty means "derive from the invoking call site".
    pub fn key_template(&self) -> &str {
        &self.key_template
    }

    pub fn param_indices(&self) -> &[usize] {
        &self.param_indices
    }

    pub fn base_expire(&self) -> Duration {
        self.base_expire
    }

    pub fn jitter(&self) -> (Duration, Duration) {
        self.jitter
    }

    pub fn callback(&self) -> Option<&Transform<V>> {
        self.callback.as_ref()
    }

    pub fn null_sentinel(&self) -> &str {
        &self.null_sentinel
    }

    pub fn stampede_protection(&self) -> bool {
        self.stampede_protection
    }

    pub fn max_lock_hold(&self) -> Duration {
        self.max_lock_hold
    }

    // == Effective TTL ==
    /// TTL for a freshly stored entry: base expire plus a uniform jitter in
    /// `[low, high)`, so entries filled in a burst do not expire together.
    ///
    /// Returns `None` (no expiration) when the base expire is zero.
    pub fn effective_ttl(&self) -> Option<Duration> {
        if self.base_expire.is_zero() {
            return None;
        }
        let (low, high) = self.jitter;
        let extra = if low < high {
            rand::rng().random_range(low..high)
        } else {
            low
        };
        Some(self.base_expire.saturating_add(extra))
    }
}

impl<V> Clone for CachePolicy<V> {
    fn clone(&self) -> Self {
        Self {
            key_template: self.key_template.clone(),
            param_indices: self.param_indices.clone(),
            base_expire: self.base_expire,
            jitter: self.jitter,
            callback: self.callback.clone(),
            null_sentinel: self.null_sentinel.clone(),
            stampede_protection: self.stampede_protection,
            max_lock_hold: self.max_lock_hold,
        }
    }
}

impl<V> fmt::Debug for CachePolicy<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("key_template", &self.key_template)
            .field("param_indices", &self.param_indices)
            .field("base_expire", &self.base_expire)
            .field("jitter", &self.jitter)
            .field("callback", &self.callback.is_some())
            .field("null_sentinel", &self.null_sentinel)
            .field("stampede_protection", &self.stampede_protection)
            .field("max_lock_hold", &self.max_lock_hold)
            .finish()
    }
}

// == Builder ==
/// Builder for [`CachePolicy`].
pub struct CachePolicyBuilder<V> {
    policy: CachePolicy<V>,
}

impl<V> Default for CachePolicyBuilder<V> {
    fn default() -> Self {
        Self {
            policy: CachePolicy {
                key_template: String::new(),
                param_indices: Vec::new(),
                base_expire: DEFAULT_EXPIRE,
                jitter: (Duration::ZERO, Duration::ZERO),
                callback: None,
                null_sentinel: String::new(),
                stampede_protection: true,
                max_lock_hold: DEFAULT_MAX_LOCK_HOLD,
            },
        }
    }
}

impl<V> CachePolicyBuilder<V> {
    pub fn key(mut self, template: impl Into<String>) -> Self {
        self.policy.key_template = template.into();
        self
    }

    /// Indices of the call arguments folded into the key, in key order.
    pub fn params(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.policy.param_indices = indices.into_iter().collect();
        self
    }

    /// Base expiration; zero stores entries without expiration.
    pub fn expire(mut self, base: Duration) -> Self {
        self.policy.base_expire = base;
        self
    }

    pub fn jitter(mut self, low: Duration, high: Duration) -> Self {
        self.policy.jitter = (low, high);
        self
    }

    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&V) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        self.policy.callback = Some(Arc::new(callback));
        self
    }

    /// Value stored in place of a computation that produced nothing.
    ///
    /// Must not be valid JSON, so it can never equal a stored value.
    pub fn null_sentinel(mut self, sentinel: impl Into<String>) -> Self {
        self.policy.null_sentinel = sentinel.into();
        self
    }

    pub fn stampede_protection(mut self, enabled: bool) -> Self {
        self.policy.stampede_protection = enabled;
        self
    }

    pub fn max_lock_hold(mut self, hold: Duration) -> Self {
        self.policy.max_lock_hold = hold;
        self
    }

    // == Build ==
    /// Validates and returns the policy.
    ///
    /// # Errors
    /// `CacheError::Config` when the jitter bounds are reversed, the lock
    /// hold is zero or the null sentinel parses as JSON.
    pub fn build(self) -> Result<CachePolicy<V>> {
        let (low, high) = self.policy.jitter;
        if low > high {
            return Err(CacheError::Config(format!(
                "jitter lower bound {}ms exceeds upper bound {}ms",
                low.as_millis(),
                high.as_millis()
            )));
        }
        if self.policy.max_lock_hold.is_zero() {
            return Err(CacheError::Config(
                "max lock hold must be greater than zero".to_string(),
            ));
        }
        if serde_json::from_str::<serde_json::Value>(&self.policy.null_sentinel).is_ok() {
            return Err(CacheError::Config(format!(
                "null sentinel {:?} is valid JSON and could collide with a cached value",
                self.policy.null_sentinel
            )));
        }
        Ok(self.policy)
    }
}
