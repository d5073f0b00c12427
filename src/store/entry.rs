//! Store Entry Module
//!
//! Defines the structure for individual in-memory store entries with TTL support.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

// == Stored Value ==
/// Kind of value held under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    String(String),
    Hash(HashMap<String, String>),
}

// == Store Entry ==
/// Represents a single store entry with value and expiry metadata.
///
/// Expiry is measured on the tokio clock so a paused runtime controls it.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The stored value
    pub value: StoredValue,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl StoreEntry {
    // == Constructor ==
    /// Creates a new entry with optional TTL.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - Optional time to live; one too large to represent never expires
    pub fn new(value: StoredValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(deadline),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// its expiration instant.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Instant::now() >= expires,
            None => false,
        }
    }

    // == Expire ==
    /// Resets the expiration to `ttl` from now.
    pub fn expire_in(&mut self, ttl: Duration) {
        self.expires_at = deadline(ttl);
    }

    // == Time To Live ==
    /// Returns remaining TTL, or None if no expiration is set.
    ///
    /// # Returns
    /// - `Some(Duration::ZERO)` if the entry has expired
    /// - `Some(remaining)` if the entry has TTL and hasn't expired
    /// - `None` if the entry never expires
    pub fn ttl_remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|expires| expires.saturating_duration_since(Instant::now()))
    }
}

fn deadline(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn string(value: &str) -> StoredValue {
        StoredValue::String(value.to_string())
    }

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = StoreEntry::new(string("test_value"), None);

        assert_eq!(entry.value, string("test_value"));
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
        assert!(entry.ttl_remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration() {
        let entry = StoreEntry::new(string("test_value"), Some(Duration::from_secs(1)));
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining_counts_down() {
        let entry = StoreEntry::new(string("test_value"), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(entry.ttl_remaining(), Some(Duration::from_secs(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_in_resets_deadline() {
        let mut entry = StoreEntry::new(string("v"), Some(Duration::from_secs(2)));
        tokio::time::advance(Duration::from_secs(1)).await;

        entry.expire_in(Duration::from_secs(5));

        assert_eq!(entry.ttl_remaining(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let mut entry = StoreEntry::new(string("v"), Some(Duration::MAX));
        assert_eq!(entry.expires_at, None);
        assert!(!entry.is_expired());

        entry.expire_in(Duration::MAX);
        assert_eq!(entry.ttl_remaining(), None);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = StoreEntry {
            value: string("test"),
            expires_at: Some(Instant::now()), // Expires exactly now
        };

        assert!(entry.is_expired(), "Entry should be expired at boundary");
    }
}
