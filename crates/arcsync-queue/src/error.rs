//! Error types for the queue layer.

/// Errors raised by a [`KeyValueStore`](crate::KeyValueStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem-backed stores surface the underlying I/O error.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure (quota exceeded, store closed, ...).
    #[error("storage backend failed: {0}")]
    Backend(String),
}

/// Errors from the offline action queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue already holds `max_len` actions; the new one was refused.
    #[error("offline queue full ({0} actions)")]
    Overflow(usize),

    /// Persisting or loading the queue failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The queue could not be serialized, or the persisted blob is corrupt.
    #[error("queue serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
