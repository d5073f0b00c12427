//! Expiry Sweep Task
//!
//! Background task that periodically purges expired entries from a
//! [`MemoryStore`]. Reads already skip expired entries; the sweep reclaims
//! the memory of keys nobody touches again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::store::MemoryStore;

/// Spawns a task that calls [`MemoryStore::cleanup_expired`] every `interval`.
///
/// The task never finishes on its own; abort the returned handle on shutdown.
///
/// # Example
/// ```ignore
/// let store = MemoryStore::new();
/// let sweep = spawn_cleanup_task(store.clone(), config.cleanup_interval());
/// // Later, during shutdown:
/// sweep.abort();
/// ```
pub fn spawn_cleanup_task(store: MemoryStore, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {}ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = store.cleanup_expired().await;
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyValueStore;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_expired_entries() {
        let store = MemoryStore::new();
        store
            .set("expire_soon", "v".to_string(), Some(Duration::from_millis(500)))
            .await
            .unwrap();

        let handle = spawn_cleanup_task(store.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // len() counts raw entries, so it only drops once the sweep ran
        assert_eq!(store.len().await, 0);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_preserves_live_entries() {
        let store = MemoryStore::new();
        store
            .set("long_lived", "v".to_string(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        store.set("persistent", "p".to_string(), None).await.unwrap();

        let handle = spawn_cleanup_task(store.clone(), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(2500)).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(
            store.get("long_lived").await.unwrap(),
            Some("v".to_string())
        );
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweep_can_be_aborted() {
        let handle = spawn_cleanup_task(MemoryStore::new(), Duration::from_secs(1));

        handle.abort();
        let err = handle.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
