//! Unified error type for the Arcsync client.

use std::time::Duration;

use arcsync_protocol::ProtocolError;
use arcsync_queue::QueueError;
use arcsync_state::StateError;
use arcsync_transport::TransportError;

use crate::ValidationError;

/// Top-level error that wraps all crate-specific errors.
///
/// Only operations whose caller must learn about failure return it:
/// [`connect`](crate::SyncService::connect) and
/// [`request_state_sync`](crate::SyncService::request_state_sync).
/// Expected failures of `send_action` come back as a
/// [`SendOutcome`](crate::SendOutcome) instead.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A transport-level error (open, subscribe, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, unknown event).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Snapshot or rollback bookkeeping failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// The offline queue refused an action or failed to persist.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The validation request itself failed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No open channel to send on.
    #[error("not connected")]
    NotConnected,

    /// An operation needs a room, but `connect` was never called (or
    /// `leave` has been called since).
    #[error("no room joined")]
    NoSession,

    /// Waited too long for a reply from the authority.
    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, &'static str),
}
