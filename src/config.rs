//! Configuration Module
//!
//! Handles loading the store connection and lock/fill tuning from environment variables.

use std::env;
use std::time::Duration;

/// Runtime configuration shared by the store, lock and cache.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection URL of the shared key-value store
    pub store_url: String,
    /// Backoff between attempts of a blocking lock acquisition, in milliseconds
    pub lock_retry_interval_ms: u64,
    /// Interval between cache reads while another owner fills a key, in milliseconds
    pub fill_poll_interval_ms: u64,
    /// Number of cache reads before a fill-waiter gives up
    pub fill_poll_attempts: u32,
    /// Hold time used by `DistributedLock::lock`, in milliseconds
    pub default_lock_hold_ms: u64,
    /// In-memory store cleanup interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `STORE_URL` - Store connection URL (default: redis://127.0.0.1:6379)
    /// - `LOCK_RETRY_INTERVAL_MS` - Blocking acquire backoff (default: 5)
    /// - `FILL_POLL_INTERVAL_MS` - Fill-wait poll interval (default: 50)
    /// - `FILL_POLL_ATTEMPTS` - Fill-wait poll attempts (default: 20)
    /// - `DEFAULT_LOCK_HOLD_MS` - Default lock hold time (default: 180000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_url: env::var("STORE_URL").unwrap_or(defaults.store_url),
            lock_retry_interval_ms: parse_env("LOCK_RETRY_INTERVAL_MS")
                .unwrap_or(defaults.lock_retry_interval_ms),
            fill_poll_interval_ms: parse_env("FILL_POLL_INTERVAL_MS")
                .unwrap_or(defaults.fill_poll_interval_ms),
            fill_poll_attempts: parse_env("FILL_POLL_ATTEMPTS")
                .unwrap_or(defaults.fill_poll_attempts),
            default_lock_hold_ms: parse_env("DEFAULT_LOCK_HOLD_MS")
                .unwrap_or(defaults.default_lock_hold_ms),
            cleanup_interval: parse_env("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
        }
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    pub fn fill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fill_poll_interval_ms)
    }

    pub fn default_lock_hold(&self) -> Duration {
        Duration::from_millis(self.default_lock_hold_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_url: "redis://127.0.0.1:6379".to_string(),
            lock_retry_interval_ms: 5,
            fill_poll_interval_ms: 50,
            fill_poll_attempts: 20,
            default_lock_hold_ms: 180_000,
            cleanup_interval: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.store_url, "redis://127.0.0.1:6379");
        assert_eq!(config.lock_retry_interval(), Duration::from_millis(5));
        assert_eq!(config.fill_poll_interval(), Duration::from_millis(50));
        assert_eq!(config.fill_poll_attempts, 20);
        assert_eq!(config.default_lock_hold(), Duration::from_secs(180));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("STORE_URL");
        env::remove_var("LOCK_RETRY_INTERVAL_MS");
        env::remove_var("FILL_POLL_INTERVAL_MS");
        env::remove_var("FILL_POLL_ATTEMPTS");
        env::remove_var("DEFAULT_LOCK_HOLD_MS");
        env::remove_var("CLEANUP_INTERVAL");

        let config = Config::from_env();
        assert_eq!(config.store_url, "redis://127.0.0.1:6379");
        assert_eq!(config.lock_retry_interval_ms, 5);
        assert_eq!(config.fill_poll_interval_ms, 50);
        assert_eq!(config.fill_poll_attempts, 20);
        assert_eq!(config.default_lock_hold_ms, 180_000);
        assert_eq!(config.cleanup_interval, 1);
    }
}
