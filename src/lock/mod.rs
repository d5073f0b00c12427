//! Lock Module
//!
//! Reentrant distributed lock backed by a shared `KeyValueStore`.

mod distributed;
mod owner;

pub use distributed::{DistributedLock, DEFAULT_RETRY_INTERVAL, LOCK_SUFFIX};
pub use owner::OwnerToken;
