//! The versioned session store: current snapshot plus rollback entries.
//!
//! # Whole-value replacement
//!
//! The current snapshot is only ever swapped for another complete
//! snapshot. Nothing here hands out `&mut SessionSnapshot`, so a reader
//! in another async step sees either the old value or the new one.

use arcsync_protocol::{now_millis, Action, ActionId, ActorId, SessionSnapshot};

use crate::{RollbackRegistry, StateError};

/// Holds the last-known session snapshot and the rollback registry.
///
/// ## Lifecycle
///
/// ```text
/// new() ──→ set_current_state(initial sync)
///              │
///              ├── record_rollback(A) + adopt(optimistic)   speculative
///              ├── confirm(A)                               authority agreed
///              ├── rollback(A)                              authority refused
///              └── apply_state_diff(server state)           authority overwrite
///                                                           (clears rollbacks)
/// reset() ──→ back to empty (logout / room leave)
/// ```
#[derive(Debug, Clone, Default)]
pub struct VersionedSessionStore {
    current: Option<SessionSnapshot>,
    rollbacks: RollbackRegistry,
}

impl VersionedSessionStore {
    /// Creates an empty store whose rollback registry holds at most
    /// `rollback_capacity` entries.
    pub fn new(rollback_capacity: usize) -> Self {
        Self {
            current: None,
            rollbacks: RollbackRegistry::new(rollback_capacity),
        }
    }

    /// The current snapshot, if any has been received.
    pub fn current_state(&self) -> Option<&SessionSnapshot> {
        self.current.as_ref()
    }

    /// Version of the current snapshot.
    pub fn version(&self) -> Option<u64> {
        self.current.as_ref().map(|s| s.version)
    }

    /// Replaces the current snapshot.
    pub fn set_current_state(&mut self, snapshot: SessionSnapshot) {
        tracing::debug!(version = snapshot.version, "session snapshot replaced");
        self.current = Some(snapshot);
    }

    /// Replaces the current snapshot with a speculative one.
    ///
    /// Same as [`set_current_state`](Self::set_current_state) but logs a
    /// warning if the speculative snapshot would move the version
    /// backwards. Only an authoritative overwrite may do that.
    pub fn adopt(&mut self, snapshot: SessionSnapshot) {
        if let Some(current) = &self.current {
            if snapshot.version < current.version {
                tracing::warn!(
                    current = current.version,
                    adopted = snapshot.version,
                    "optimistic snapshot regresses the session version"
                );
            }
        }
        self.current = Some(snapshot);
    }

    /// Returns `state` advanced by one version, stamped now and by `actor_id`.
    ///
    /// Pure: the store itself is not touched.
    pub fn apply_versioned_update(
        state: &SessionSnapshot,
        actor_id: &ActorId,
    ) -> SessionSnapshot {
        SessionSnapshot {
            version: state.version + 1,
            last_modified: now_millis(),
            last_modified_by: actor_id.clone(),
            payload: state.payload.clone(),
        }
    }

    /// `true` iff `server_version` differs from the local version.
    ///
    /// Deliberately an equality test: a server that is *behind* the client
    /// is a conflict too. With no local snapshot every server version is a
    /// conflict.
    pub fn detect_version_conflict(&self, server_version: u64) -> bool {
        self.version() != Some(server_version)
    }

    /// Authoritative overwrite.
    ///
    /// Replaces the snapshot with `server_state`, drops every rollback
    /// entry (the server state supersedes all speculation), and returns
    /// the subset of `queued` the server has not seen yet: actions with
    /// `timestamp > server_state.last_modified`, in their original order.
    pub fn apply_state_diff(
        &mut self,
        server_state: SessionSnapshot,
        queued: Vec<Action>,
    ) -> Vec<Action> {
        let cutoff = server_state.last_modified;
        let before = queued.len();
        let retained: Vec<Action> = queued
            .into_iter()
            .filter(|a| a.timestamp > cutoff)
            .collect();

        tracing::info!(
            version = server_state.version,
            dropped = before - retained.len(),
            retained = retained.len(),
            "authoritative state applied"
        );

        self.rollbacks.clear();
        self.current = Some(server_state);
        retained
    }

    /// Remembers the current snapshot as the pre-update state of `action_id`.
    ///
    /// Returns `false` when there is no current snapshot to remember.
    pub fn record_rollback(&mut self, action_id: &ActionId) -> bool {
        let Some(current) = self.current.clone() else {
            return false;
        };
        self.rollbacks.insert(action_id.clone(), current);
        true
    }

    /// Restores the snapshot recorded for `action_id` and forgets the entry.
    ///
    /// # Errors
    /// Returns [`StateError::NoRollback`] if there is no entry; the current
    /// snapshot is left unchanged in that case.
    pub fn rollback(
        &mut self,
        action_id: &ActionId,
    ) -> Result<SessionSnapshot, StateError> {
        let before = self
            .rollbacks
            .take(action_id)
            .ok_or_else(|| StateError::NoRollback(action_id.clone()))?;
        tracing::info!(%action_id, version = before.version, "rolled back optimistic update");
        self.current = Some(before.clone());
        Ok(before)
    }

    /// The authority confirmed `action_id`; its rollback entry is no longer
    /// needed. Returns whether an entry existed.
    pub fn confirm(&mut self, action_id: &ActionId) -> bool {
        self.rollbacks.remove(action_id)
    }

    /// Drops every rollback entry without touching the snapshot.
    pub fn clear_rollbacks(&mut self) {
        self.rollbacks.clear();
    }

    pub fn rollbacks(&self) -> &RollbackRegistry {
        &self.rollbacks
    }

    /// Forgets the snapshot and every rollback entry.
    pub fn reset(&mut self) {
        self.current = None;
        self.rollbacks.clear();
    }
}

// =========================================================================
// Tests
// =========================================================================
