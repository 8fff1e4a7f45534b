//! Inbound pump: channel frames → local bookkeeping → observers.
//!
//! Local bookkeeping happens under the shared lock; observers run after
//! it is released, so they may call back into the service.

use std::sync::Arc;

use arcsync_protocol::{
    now_millis, ConflictPayload, ConnectionStatePatch, GameActionPayload,
    ProtocolError, ServerEvent, StateSyncPayload,
};
use arcsync_queue::KeyValueStore;
use arcsync_transport::{Channel, Connector, Frame};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::dispatcher::ConflictEvent;
use crate::validation::Validator;
use crate::SyncService;

impl<C: Connector, V: Validator, S: KeyValueStore> SyncService<C, V, S> {
    /// Reads `channel` until it ends, then hands over to reconnection.
    pub(crate) async fn run_pump(&self, generation: u64, channel: Arc<C::Channel>) {
        loop {
            match channel.recv().await {
                Ok(Some(frame)) => self.handle_frame(frame),
                Ok(None) => {
                    info!(channel = %channel.id(), "channel closed");
                    break;
                }
                Err(e) => {
                    warn!(channel = %channel.id(), error = %e, "channel receive failed");
                    break;
                }
            }
        }
        self.channel_lost(generation);
    }

    fn handle_frame(&self, frame: Frame) {
        match ServerEvent::decode(&frame.event, &frame.payload, &self.inner.codec) {
            Ok(event) => self.handle_server_event(event),
            Err(ProtocolError::UnknownEvent(name)) => {
                debug!(event = %name, "skipping unknown event");
            }
            Err(e) => {
                warn!(event = %frame.event, error = %e, "dropping undecodable event");
            }
        }
    }

    /// Applies an inbound event locally, then notifies observers.
    pub(crate) fn handle_server_event(&self, event: ServerEvent) {
        trace!(event = event.name(), "inbound");
        match &event {
            ServerEvent::GameAction(payload) => {
                if let Some(conflict) = self.on_inbound_action(payload) {
                    self.inner
                        .dispatcher
                        .emit_conflict(&ConflictEvent::Detected(conflict));
                }
            }
            ServerEvent::StateSync(payload) => self.apply_inbound_sync(payload),
            ServerEvent::Heartbeat(payload) => {
                let mut shared = self.lock();
                let own = shared
                    .session
                    .as_ref()
                    .is_some_and(|s| s.actor_id == payload.player_id);
                if !own {
                    shared.monitor.record_heartbeat(Instant::now());
                    shared.patch_connection(ConnectionStatePatch {
                        last_heartbeat: Some(now_millis()),
                        missed_heartbeats: Some(0),
                        ..ConnectionStatePatch::default()
                    });
                }
            }
            ServerEvent::RequestStateSync(_) => {
                debug!("ignoring state sync request; the authority answers those");
            }
            ServerEvent::ConflictDetected(_) | ServerEvent::ConnectionLost(_) => {}
        }
        self.inner.dispatcher.dispatch(&event);
    }

    /// Confirms our own pending action, or checks someone else's against
    /// the local version. Returns a conflict to report, if any.
    fn on_inbound_action(&self, payload: &GameActionPayload) -> Option<ConflictPayload> {
        let mut shared = self.lock();
        let id = &payload.action.id;

        let had_rollback = shared.store.confirm(id);
        let was_queued = shared.queue.dequeue(id).is_some();
        if had_rollback || was_queued {
            debug!(action_id = %id, "authority confirmed action");
            return None;
        }

        let local = shared.store.version()?;
        if payload.validated && shared.store.detect_version_conflict(payload.version) {
            warn!(
                action_id = %id,
                local_version = local,
                action_version = payload.version,
                "inbound action based on a different version"
            );
            return Some(ConflictPayload {
                action: payload.action.clone(),
                reason: "version mismatch".to_string(),
                expected_version: local,
                actual_version: payload.version,
            });
        }
        None
    }

    /// The authority's sync is a hard reset of pending work.
    fn apply_inbound_sync(&self, payload: &StateSyncPayload) {
        let waiters = {
            let mut shared = self.lock();
            shared.store.set_current_state(payload.state.clone());
            shared.store.clear_rollbacks();
            let discarded = shared.queue.len();
            shared.queue.clear();
            if discarded > 0 {
                info!(discarded, "state sync discarded queued actions");
            }
            std::mem::take(&mut shared.sync_waiters)
        };
        info!(version = payload.version, "state sync applied");

        for waiter in waiters {
            let _ = waiter.send(payload.clone());
        }
    }
}
