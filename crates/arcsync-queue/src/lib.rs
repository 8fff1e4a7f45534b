//! Durable offline action queue for Arcsync.
//!
//! When an action can't be sent (channel down, validation unreachable,
//! broadcast failed) it lands in the [`OfflineActionQueue`]. The queue:
//!
//! 1. **Preserves order**: entries replay in exactly the order they
//!    were enqueued, never reordered by retry count
//! 2. **Survives restarts**: every mutation writes the whole queue to a
//!    [`KeyValueStore`]; [`OfflineActionQueue::load`] reads it back
//! 3. **Bounds retries**: an entry that keeps failing is dropped after
//!    `max_retries` attempts and handed back to the caller to report
//!
//! The storage backend is a collaborator: Arcsync ships a
//! [`MemoryStore`] and a directory-backed [`FileStore`]; hosts with their
//! own persistence implement the trait.

mod error;
mod queue;
mod storage;

pub use error::{QueueError, StorageError};
pub use queue::{OfflineActionQueue, QueueConfig, QueuedAction, RetryDecision};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
