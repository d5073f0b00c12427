//! Redis store implementation.

use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, Script};
use tracing::info;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::store::{KeyValueStore, HOLDS_FIELD, OWNER_FIELD};

// Lock scripts. KEYS[1] = lock record, ARGV[1] = owner, ARGV[2] = owner field,
// ARGV[3] = holds field, ARGV[4] = ttl in milliseconds.
const ACQUIRE_SCRIPT: &str = r#"
    local owner = redis.call("hget", KEYS[1], ARGV[2])
    if not owner then
        redis.call("del", KEYS[1])
        redis.call("hset", KEYS[1], ARGV[2], ARGV[1], ARGV[3], 1)
        redis.call("pexpire", KEYS[1], ARGV[4])
        return 1
    end
    if owner == ARGV[1] then
        local holds = redis.call("hincrby", KEYS[1], ARGV[3], 1)
        redis.call("pexpire", KEYS[1], ARGV[4])
        return holds
    end
    return 0
"#;

const RENEW_SCRIPT: &str = r#"
    if redis.call("hget", KEYS[1], ARGV[2]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[4])
    end
    return 0
"#;

const RELEASE_SCRIPT: &str = r#"
    if redis.call("hget", KEYS[1], ARGV[2]) ~= ARGV[1] then
        return -1
    end
    local holds = redis.call("hincrby", KEYS[1], ARGV[3], -1)
    if holds <= 0 then
        redis.call("del", KEYS[1])
        return 0
    end
    return holds
"#;

/// Redis-backed store.
///
/// The lock commands run as server-side Lua scripts, so the owner check and
/// the hold-count update are one atomic step.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    acquire: Script,
    renew: Script,
    release: Script,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use stampede_cache::store::RedisStore;
    ///
    /// # async fn run() -> Result<(), stampede_cache::error::StoreError> {
    /// let store = RedisStore::connect("redis://127.0.0.1:6379").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!("Connected to Redis store at {}", url);
        Ok(Self {
            connection,
            acquire: Script::new(ACQUIRE_SCRIPT),
            renew: Script::new(RENEW_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        })
    }

    /// Connect using `Config::store_url`.
    pub async fn from_config(config: &Config) -> StoreResult<Self> {
        Self::connect(&config.store_url).await
    }

    /// Get the underlying connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}

/// Redis rejects a zero expiry, so sub-millisecond TTLs round up.
fn millis(ttl: Duration) -> u64 {
    ttl.as_millis().clamp(1, u64::MAX as u128) as u64
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(updated == 1)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.connection.clone();
        let ttl_ms: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;

        // -2: key doesn't exist, -1: no expiration
        match ttl_ms {
            ms if ms >= 0 => Ok(Some(Duration::from_millis(ms as u64))),
            _ => Ok(None),
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let set: i64 = redis::cmd("HSETNX")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(set == 1)
    }

    async fn hash_increment(&self, key: &str, field: &str, delta: i64) -> StoreResult<i64> {
        let mut conn = self.connection.clone();
        let value: i64 = redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(delta)
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn acquire_reentrant(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> StoreResult<Option<u64>> {
        let mut conn = self.connection.clone();
        let holds: i64 = self
            .acquire
            .key(key)
            .arg(owner)
            .arg(OWNER_FIELD)
            .arg(HOLDS_FIELD)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok((holds > 0).then_some(holds as u64))
    }

    async fn renew_owned(&self, key: &str, owner: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection.clone();
        let renewed: i64 = self
            .renew
            .key(key)
            .arg(owner)
            .arg(OWNER_FIELD)
            .arg(HOLDS_FIELD)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(renewed == 1)
    }

    async fn release_reentrant(&self, key: &str, owner: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.connection.clone();
        let remaining: i64 = self
            .release
            .key(key)
            .arg(owner)
            .arg(OWNER_FIELD)
            .arg(HOLDS_FIELD)
            .invoke_async(&mut conn)
            .await?;
        Ok((remaining >= 0).then_some(remaining as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_rounds_up_to_one() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_micros(300)), 1);
        assert_eq!(millis(Duration::from_secs(30)), 30_000);
    }

    #[test]
    fn test_scripts_address_lock_fields_through_argv() {
        for script in [ACQUIRE_SCRIPT, RENEW_SCRIPT, RELEASE_SCRIPT] {
            assert!(script.contains("KEYS[1]"));
            assert!(script.contains("ARGV[2]"));
            assert!(!script.contains(&format!("\"{}\"", HOLDS_FIELD)));
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = RedisStore::connect("not a url").await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
