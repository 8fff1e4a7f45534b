//! Offline queue replay.

use arcsync_protocol::GameActionPayload;
use arcsync_queue::{KeyValueStore, QueuedAction, RetryDecision};
use arcsync_transport::Connector;
use tracing::{debug, info, warn};

use crate::dispatcher::ConflictEvent;
use crate::validation::Validator;
use crate::SyncService;

/// Counts from one [`process_queued_actions`](SyncService::process_queued_actions) pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Broadcast successfully.
    pub sent: usize,
    /// Failed and left in place for the next pass.
    pub requeued: usize,
    /// Failed for the last allowed time and reported.
    pub dropped: usize,
    /// Confirmed or cleared by a state sync while the pass ran.
    pub superseded: usize,
}

impl<C: Connector, V: Validator, S: KeyValueStore> SyncService<C, V, S> {
    /// Replays the offline queue in original order.
    ///
    /// No-op when disconnected or when the queue is empty. Each entry is
    /// broadcast with `validated: false`; the authority re-validates it
    /// on arrival. An entry leaves the queue only once its send
    /// succeeded, so a pass cut short (disconnect, superseding connect)
    /// leaves every unsent entry queued and persisted. The entry whose
    /// send was in flight may go out twice.
    ///
    /// A failed send bumps the entry's retry count in place. On its
    /// `max_retries`th failure it is dropped and reported as
    /// [`ConflictEvent::ActionDropped`].
    pub async fn process_queued_actions(&self) -> ReplaySummary {
        let _op = self.inner.ops.lock().await;

        let pending: Vec<QueuedAction> = {
            let shared = self.lock();
            if !shared.connection.is_connected || shared.queue.is_empty() {
                return ReplaySummary::default();
            }
            shared.queue.entries().cloned().collect()
        };
        info!(count = pending.len(), "replaying offline queue");

        let mut summary = ReplaySummary::default();
        for entry in pending {
            let id = &entry.action.id;
            let version = {
                let shared = self.lock();
                if !shared.queue.contains(id) {
                    summary.superseded += 1;
                    continue;
                }
                shared.store.version().unwrap_or(0)
            };
            let payload = GameActionPayload {
                action: entry.action.clone(),
                version,
                validated: false,
            };

            let error = match self.broadcast(&payload).await {
                Ok(()) => {
                    self.lock().queue.dequeue(id);
                    debug!(action_id = %id, "queued action sent");
                    summary.sent += 1;
                    continue;
                }
                Err(e) => e,
            };

            let decision = self.lock().queue.record_failure(id);
            match decision {
                Some(RetryDecision::Retry(retry_count)) => {
                    warn!(action_id = %id, retry_count, error = %error, "queued action failed");
                    summary.requeued += 1;
                }
                Some(RetryDecision::Drop(dropped)) => {
                    warn!(
                        action_id = %id,
                        retries = dropped.retry_count,
                        error = %error,
                        "queued action dropped after repeated failures"
                    );
                    summary.dropped += 1;
                    self.inner.dispatcher.emit_conflict(&ConflictEvent::ActionDropped {
                        action: dropped.action,
                        retries: dropped.retry_count,
                    });
                }
                None => {
                    debug!(action_id = %id, "failed entry already superseded");
                    summary.superseded += 1;
                }
            }
        }

        summary
    }
}
