//! Optimistic sends: validate, apply speculatively, broadcast or queue.
//!
//! ```text
//! send_action(A, S2?)
//!   ├─ not connected ───────────────→ queue A, adopt S2        Queued
//!   ├─ no snapshot yet ─────────────→                          NoBaseline
//!   └─ validate
//!        ├─ valid: false ───────────→ roll back, report        Rejected
//!        ├─ error / timeout ────────→ queue A, adopt S2        Queued
//!        └─ valid: true ────────────→ record rollback,
//!                                     adopt S2, broadcast ──→  Sent
//!                                       └─ send failed ─────→  Queued
//! ```

use arcsync_protocol::{Action, GameActionPayload, SessionSnapshot};
use arcsync_queue::KeyValueStore;
use arcsync_transport::Connector;
use tracing::{debug, warn};

use crate::dispatcher::ConflictEvent;
use crate::validation::{ValidationOutcome, ValidationRequest, Validator};
use crate::SyncService;

/// What became of a [`send_action`](SyncService::send_action) call.
///
/// None of these are errors: every expected failure mode has a variant.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Validated and broadcast.
    Sent {
        optimistic_state: Option<SessionSnapshot>,
    },
    /// Held in the offline queue for the next replay.
    Queued {
        optimistic_state: Option<SessionSnapshot>,
    },
    /// Explicitly refused by the validator and rolled back. Not retried.
    Rejected { reason: String },
    /// Connected, but no session snapshot has arrived yet.
    NoBaseline,
    /// The offline queue was full; the action was discarded and
    /// reported on the conflict channel.
    Dropped,
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// The speculative state now current, if one was adopted.
    pub fn optimistic_state(&self) -> Option<&SessionSnapshot> {
        match self {
            Self::Sent { optimistic_state } | Self::Queued { optimistic_state } => {
                optimistic_state.as_ref()
            }
            _ => None,
        }
    }
}

enum Step {
    Queue,
    NoBaseline,
    Validate(ValidationRequest),
}

impl<C: Connector, V: Validator, S: KeyValueStore> SyncService<C, V, S> {
    /// Proposes `action`, optionally applying `optimistic_state` locally
    /// before the authority confirms it.
    ///
    /// Serialised with other sends, replays and state diffs of this
    /// service.
    pub async fn send_action(
        &self,
        action: Action,
        optimistic_state: Option<SessionSnapshot>,
    ) -> SendOutcome {
        let _op = self.inner.ops.lock().await;

        let step = {
            let shared = self.lock();
            if !shared.connection.is_connected {
                Step::Queue
            } else if let Some(current) = shared.store.current_state() {
                let actor_id = shared
                    .session
                    .as_ref()
                    .map_or_else(|| action.actor_id.clone(), |s| s.actor_id.clone());
                Step::Validate(ValidationRequest {
                    session_state: current.clone(),
                    action: action.clone(),
                    actor_id,
                })
            } else {
                Step::NoBaseline
            }
        };

        let request = match step {
            Step::Queue => {
                debug!(action_id = %action.id, "offline; queueing action");
                return self.enqueue(action, optimistic_state, true);
            }
            Step::NoBaseline => {
                warn!(action_id = %action.id, "no session snapshot yet; action not sent");
                return SendOutcome::NoBaseline;
            }
            Step::Validate(request) => request,
        };

        if self.inner.config.validation_enabled {
            match self.inner.validation.validate(&request).await {
                ValidationOutcome::Accepted => {}
                ValidationOutcome::Rejected(reason) => {
                    self.handle_validation_failure(&action, &reason);
                    return SendOutcome::Rejected { reason };
                }
                ValidationOutcome::Unknown(_) => {
                    return self.enqueue(action, optimistic_state, true);
                }
            }
        }

        let base_version = {
            let mut shared = self.lock();
            let base_version = shared.store.version().unwrap_or(0);
            shared.store.record_rollback(&action.id);
            if let Some(state) = &optimistic_state {
                shared.store.adopt(state.clone());
            }
            base_version
        };

        let payload = GameActionPayload {
            action,
            version: base_version,
            validated: true,
        };
        match self.broadcast(&payload).await {
            Ok(()) => {
                debug!(
                    action_id = %payload.action.id,
                    kind = %payload.action.kind,
                    version = base_version,
                    "action sent"
                );
                SendOutcome::Sent { optimistic_state }
            }
            Err(e) => {
                warn!(action_id = %payload.action.id, error = %e, "send failed; queueing action");
                self.enqueue(payload.action, optimistic_state, false)
            }
        }
    }

    /// Undoes the optimistic effect of `action` after the authority
    /// refused it, and reports `reason` on the conflict channel.
    ///
    /// Returns the restored snapshot, or `None` when `action` had no
    /// rollback entry (never applied, already confirmed, or superseded
    /// by a state sync). The reason is reported either way.
    pub fn handle_validation_failure(
        &self,
        action: &Action,
        reason: &str,
    ) -> Option<SessionSnapshot> {
        let restored = {
            let mut shared = self.lock();
            match shared.store.rollback(&action.id) {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    debug!(action_id = %action.id, error = %e, "nothing to roll back");
                    None
                }
            }
        };

        warn!(action_id = %action.id, kind = %action.kind, %reason, "action refused");
        self.inner
            .dispatcher
            .emit_conflict(&ConflictEvent::ActionRejected {
                action: action.clone(),
                reason: reason.to_string(),
            });
        restored
    }

    /// Queues `action`. With `adopt`, also records a rollback entry and
    /// adopts `optimistic_state`; without, the caller already did.
    fn enqueue(
        &self,
        action: Action,
        optimistic_state: Option<SessionSnapshot>,
        adopt: bool,
    ) -> SendOutcome {
        let result = {
            let mut shared = self.lock();
            match shared.queue.enqueue(action.clone()) {
                Ok(()) => {
                    if adopt {
                        if let Some(state) = &optimistic_state {
                            shared.store.record_rollback(&action.id);
                            shared.store.adopt(state.clone());
                        }
                    }
                    Ok(())
                }
                Err(e) => {
                    if !adopt {
                        // Undo what the caller applied; the action is gone.
                        let _ = shared.store.rollback(&action.id);
                    }
                    Err(e)
                }
            }
        };

        match result {
            Ok(()) => SendOutcome::Queued { optimistic_state },
            Err(e) => {
                warn!(action_id = %action.id, error = %e, "action dropped");
                self.inner
                    .dispatcher
                    .emit_conflict(&ConflictEvent::ActionDropped { action, retries: 0 });
                SendOutcome::Dropped
            }
        }
    }
}
