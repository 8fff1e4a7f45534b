//! Bounded map from an optimistic action to the snapshot it replaced.

use std::collections::{HashMap, VecDeque};

use arcsync_protocol::{ActionId, SessionSnapshot};

/// Default number of rollback entries kept before the oldest is evicted.
pub const DEFAULT_ROLLBACK_CAPACITY: usize = 256;

/// Remembers, per optimistic action, the snapshot to restore if the
/// authority rejects it.
///
/// ```text
/// apply optimistic A  ──→ insert(A, S1)
///         │
///         ├── authority confirms A  ──→ remove(A)
///         ├── authority rejects A   ──→ take(A) → restore S1
///         └── state_sync arrives    ──→ clear()
/// ```
///
/// A long offline stretch could otherwise grow this without bound, so
/// it holds at most `capacity` entries and evicts the oldest first.
/// An evicted action can no longer be rolled back individually; the
/// next state sync still resets everything.
#[derive(Debug, Clone)]
pub struct RollbackRegistry {
    entries: HashMap<ActionId, SessionSnapshot>,
    /// Insertion order, oldest at the front. Kept in sync with `entries`.
    order: VecDeque<ActionId>,
    capacity: usize,
}

impl RollbackRegistry {
    /// Creates an empty registry. A capacity of 0 is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records the pre-update snapshot for `id`.
    ///
    /// Re-inserting an existing id keeps the first snapshot, which is the
    /// one that predates all of that action's effects. Returns the id that
    /// was evicted to make room, if any.
    pub fn insert(
        &mut self,
        id: ActionId,
        before: SessionSnapshot,
    ) -> Option<ActionId> {
        if self.entries.contains_key(&id) {
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            let oldest = self.order.pop_front();
            if let Some(oldest) = &oldest {
                self.entries.remove(oldest);
                tracing::debug!(action_id = %oldest, "rollback entry evicted");
            }
            oldest
        } else {
            None
        };

        self.order.push_back(id.clone());
        self.entries.insert(id, before);
        evicted
    }

    /// Removes and returns the entry for `id`.
    pub fn take(&mut self, id: &ActionId) -> Option<SessionSnapshot> {
        let snapshot = self.entries.remove(id)?;
        self.order.retain(|o| o != id);
        Some(snapshot)
    }

    /// Removes the entry for `id`. Returns whether one existed.
    pub fn remove(&mut self, id: &ActionId) -> bool {
        self.take(id).is_some()
    }

    pub fn get(&self, id: &ActionId) -> Option<&SessionSnapshot> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ActionId) -> bool {
        self.entries.contains_key(id)
    }

    /// Drops every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RollbackRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_ROLLBACK_CAPACITY)
    }
}
