//! Error types for the state layer.

use arcsync_protocol::ActionId;

/// Errors from snapshot and rollback bookkeeping.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// No snapshot has been received yet, so there is nothing to act on.
    /// Happens between connecting and the first state sync.
    #[error("no session snapshot yet")]
    NoSnapshot,

    /// No rollback entry exists for the action. Either it was never
    /// applied optimistically, it was already confirmed or rolled back,
    /// or a state sync superseded it.
    #[error("no rollback entry for action {0}")]
    NoRollback(ActionId),
}
