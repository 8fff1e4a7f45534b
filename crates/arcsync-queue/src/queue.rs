//! The offline action queue.

use std::collections::VecDeque;

use arcsync_protocol::{Action, ActionId};
use serde::{Deserialize, Serialize};

use crate::{KeyValueStore, QueueError};

// ---------------------------------------------------------------------------
// QueueConfig
// ---------------------------------------------------------------------------

/// Configuration for the offline queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Failed send attempts after which an entry is dropped. Default: 3.
    pub max_retries: u32,

    /// Most entries the queue holds. Enqueueing beyond this fails with
    /// [`QueueError::Overflow`]. Default: 1000.
    pub max_len: usize,

    /// Key the serialized queue is stored under.
    pub storage_key: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_len: 1000,
            storage_key: "arcsync:offline-queue".to_string(),
        }
    }
}

impl QueueConfig {
    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// - `max_retries` and `max_len` are at least 1.
    pub fn validated(mut self) -> Self {
        if self.max_retries == 0 {
            tracing::warn!("max_retries of 0 would drop every entry; using 1");
            self.max_retries = 1;
        }
        if self.max_len == 0 {
            tracing::warn!("max_len of 0 would refuse every action; using 1");
            self.max_len = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// QueuedAction / RetryDecision
// ---------------------------------------------------------------------------

/// An action waiting to be sent, with its failure count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub action: Action,
    pub retry_count: u32,
}

impl QueuedAction {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            retry_count: 0,
        }
    }
}

/// What became of an entry after a failed send.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Still under the retry limit: it stays where it was, with this
    /// many failures recorded.
    Retry(u32),
    /// Out of retries: removed from the queue, to be reported.
    Drop(QueuedAction),
}

// ---------------------------------------------------------------------------
// OfflineActionQueue
// ---------------------------------------------------------------------------

/// Order-preserving, persisted queue of unsent actions.
///
/// ## Replay cycle
///
/// ```text
/// enqueue(A1), enqueue(A2), enqueue(A3)        [A1 A2 A3]
///   send A1 ok   → dequeue(A1)                 [A2 A3]
///   send A2 fails → record_failure(A2)         [A2 A3]   (A2 retry_count 1)
///   send A3 ok   → dequeue(A3)                 [A2]
/// ```
///
/// Entries leave only once their send succeeded or they ran out of
/// retries, so a replay pass cut short at any point loses nothing.
///
/// Every method that changes the entries writes the full queue to the
/// store. A persistence failure is logged and the in-memory queue stays
/// authoritative, so a flaky disk never loses actions from this run.
pub struct OfflineActionQueue<S: KeyValueStore> {
    entries: VecDeque<QueuedAction>,
    store: S,
    config: QueueConfig,
}

impl<S: KeyValueStore> OfflineActionQueue<S> {
    /// Creates an empty queue. Anything already persisted under the
    /// storage key is left alone until the first mutation overwrites it.
    pub fn new(store: S, config: QueueConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            store,
            config: config.validated(),
        }
    }

    /// Creates a queue holding whatever was persisted under the
    /// configured key.
    ///
    /// A corrupt blob is logged, removed from the store, and treated as an
    /// empty queue: one unreadable write must not wedge every future
    /// session.
    pub fn load(store: S, config: QueueConfig) -> Self {
        let mut queue = Self::new(store, config);
        match queue.read_persisted() {
            Ok(entries) => {
                if !entries.is_empty() {
                    tracing::info!(count = entries.len(), "offline queue restored");
                }
                queue.entries = entries.into();
            }
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable offline queue");
                if let Err(e) = queue.store.remove(&queue.config.storage_key) {
                    tracing::warn!(error = %e, "failed to remove unreadable offline queue");
                }
            }
        }
        queue
    }

    /// Appends `action` at the back and persists.
    ///
    /// # Errors
    /// [`QueueError::Overflow`] if the queue already holds `max_len`
    /// entries. The action is not stored.
    pub fn enqueue(&mut self, action: Action) -> Result<(), QueueError> {
        if self.entries.len() >= self.config.max_len {
            return Err(QueueError::Overflow(self.entries.len()));
        }
        tracing::debug!(action_id = %action.id, kind = %action.kind, "action queued");
        self.entries.push_back(QueuedAction::new(action));
        self.persist();
        Ok(())
    }

    /// Removes the entry for `id`, e.g. once the authority confirmed it.
    pub fn dequeue(&mut self, id: &ActionId) -> Option<QueuedAction> {
        let pos = self.entries.iter().position(|e| &e.action.id == id)?;
        let removed = self.entries.remove(pos);
        self.persist();
        removed
    }

    /// Counts one more failed send for `id` and persists the new count.
    ///
    /// Returns `None` if `id` is no longer queued (confirmed or cleared
    /// since the send started).
    pub fn record_failure(&mut self, id: &ActionId) -> Option<RetryDecision> {
        let pos = self.entries.iter().position(|e| &e.action.id == id)?;
        let retry_count = {
            let entry = &mut self.entries[pos];
            entry.retry_count += 1;
            entry.retry_count
        };
        let decision = if retry_count >= self.config.max_retries {
            RetryDecision::Drop(self.entries.remove(pos)?)
        } else {
            RetryDecision::Retry(retry_count)
        };
        self.persist();
        Some(decision)
    }

    /// Replaces the contents with `actions`, in the given order.
    ///
    /// Entries whose action was already queued keep their retry count.
    pub fn replace(&mut self, actions: Vec<Action>) {
        let previous: Vec<QueuedAction> = self.entries.drain(..).collect();
        self.entries = actions
            .into_iter()
            .map(|action| {
                let retry_count = previous
                    .iter()
                    .find(|e| e.action.id == action.id)
                    .map_or(0, |e| e.retry_count);
                QueuedAction {
                    action,
                    retry_count,
                }
            })
            .collect();
        self.persist();
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.persist();
    }

    /// The queued actions, oldest first.
    pub fn actions(&self) -> Vec<Action> {
        self.entries.iter().map(|e| e.action.clone()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueuedAction> {
        self.entries.iter()
    }

    pub fn contains(&self, id: &ActionId) -> bool {
        self.entries.iter().any(|e| &e.action.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_persisted(&self) -> Result<Vec<QueuedAction>, QueueError> {
        match self.store.get(&self.config.storage_key)? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_persisted(&self) -> Result<(), QueueError> {
        if self.entries.is_empty() {
            self.store.remove(&self.config.storage_key)?;
        } else {
            let blob = serde_json::to_string(&self.entries)?;
            self.store.set(&self.config.storage_key, &blob)?;
        }
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.write_persisted() {
            tracing::warn!(
                error = %e,
                len = self.entries.len(),
                "failed to persist offline queue"
            );
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
