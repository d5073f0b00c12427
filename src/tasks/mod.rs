//! Background Tasks Module
//!
//! Contains background tasks that run alongside an in-memory store.
//!
//! # Tasks
//! - TTL Cleanup: Removes expired store entries at configured intervals

mod cleanup;

pub use cleanup::spawn_cleanup_task;
