//! `SyncService`: the per-session client and its connection controller.
//!
//! One service instance owns one room session. It ties the layers
//! together: transport → protocol → state / queue → observers.
//!
//! ## Tasks
//!
//! ```text
//!                     ┌───────────── SyncService (Arc<Inner>) ─────────────┐
//! caller ── connect ──┤ establish: open → subscribe → spawn ───┬─ pump      │
//!        ── send ─────┤                                       └─ heartbeat │
//!                     │ channel closed / silence ──→ reconnect task        │
//!                     └────────────────────────────────────────────────────┘
//! ```
//!
//! Every background task is tagged with the generation it was spawned
//! for. `connect`, `disconnect` and a reconnect bump the generation and
//! abort the old handles, so a task that outlives its channel finds its
//! generation stale and does nothing.
//!
//! ## Locks
//!
//! - `ops` (async) serialises `send_action`, `process_queued_actions`
//!   and `apply_state_diff`, the read-modify-write paths on the snapshot
//!   and queue.
//! - `shared` (sync) guards the snapshot, queue, connection state and
//!   task handles. It is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use arcsync_liveness::{Backoff, LinkState, Liveness, LivenessMonitor};
use arcsync_protocol::{
    now_millis, Action, ActionId, ActorId, Codec, ConnectionLostPayload,
    ConnectionState, ConnectionStatePatch, GameActionPayload, HeartbeatPayload,
    JsonCodec, RequestStateSyncPayload, RoomId, SessionSnapshot,
    StateSyncPayload, WireEvent,
};
use arcsync_queue::{KeyValueStore, OfflineActionQueue};
use arcsync_state::VersionedSessionStore;
use arcsync_transport::{Channel, Connector};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::dispatcher::{ConflictEvent, EventDispatcher, Subscription};
use crate::validation::{RemoteValidationClient, Validator};
use crate::{SyncConfig, SyncError};

/// Which room, as whom.
#[derive(Debug, Clone)]
pub(crate) struct Session {
    pub(crate) room_id: RoomId,
    pub(crate) actor_id: ActorId,
}

/// Background tasks and the channel they serve.
pub(crate) struct Tasks<Ch> {
    pub(crate) channel: Option<Arc<Ch>>,
    pub(crate) pump: Option<JoinHandle<()>>,
    pub(crate) heartbeat: Option<JoinHandle<()>>,
    pub(crate) reconnect: Option<JoinHandle<()>>,
}

impl<Ch> Tasks<Ch> {
    fn new() -> Self {
        Self {
            channel: None,
            pump: None,
            heartbeat: None,
            reconnect: None,
        }
    }

    /// Aborts the pump and heartbeat and hands back the channel.
    fn take_channel(&mut self) -> Option<Arc<Ch>> {
        for handle in [self.pump.take(), self.heartbeat.take()].into_iter().flatten() {
            handle.abort();
        }
        self.channel.take()
    }
}

/// Everything the background tasks and the caller share.
pub(crate) struct Shared<Ch, S: KeyValueStore> {
    pub(crate) session: Option<Session>,
    pub(crate) store: VersionedSessionStore,
    pub(crate) queue: OfflineActionQueue<S>,
    /// Connectivity fields only; `queued_actions` is read from `queue`.
    pub(crate) connection: ConnectionState,
    pub(crate) link: LinkState,
    pub(crate) backoff: Backoff,
    pub(crate) monitor: LivenessMonitor,
    pub(crate) generation: u64,
    pub(crate) sync_waiters: Vec<oneshot::Sender<StateSyncPayload>>,
    pub(crate) tasks: Tasks<Ch>,
}

impl<Ch, S: KeyValueStore> Shared<Ch, S> {
    /// The public view of the connection, queue included.
    pub(crate) fn connection_state(&self) -> ConnectionState {
        self.connection.patched(ConnectionStatePatch {
            queued_actions: Some(self.queue.actions()),
            ..ConnectionStatePatch::default()
        })
    }

    pub(crate) fn patch_connection(&mut self, patch: ConnectionStatePatch) {
        self.connection = self.connection.patched(patch);
    }

    /// Moves the link to `next`, logging transitions the state machine
    /// doesn't allow.
    pub(crate) fn transition(&mut self, next: LinkState) {
        if self.link == next {
            return;
        }
        if !self.link.can_transition_to(next) {
            warn!(from = %self.link, to = %next, "unexpected link transition");
        }
        debug!(from = %self.link, to = %next, "link state");
        self.link = next;
        self.patch_connection(ConnectionStatePatch {
            is_connected: Some(next.is_connected()),
            is_reconnecting: Some(next.is_reconnecting()),
            ..ConnectionStatePatch::default()
        });
    }
}

pub(crate) struct Inner<C: Connector, V: Validator, S: KeyValueStore> {
    pub(crate) connector: C,
    pub(crate) validation: RemoteValidationClient<V>,
    pub(crate) config: SyncConfig,
    pub(crate) codec: JsonCodec,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) ops: tokio::sync::Mutex<()>,
    pub(crate) shared: Mutex<Shared<C::Channel, S>>,
}

/// A synchronized client session for one room.
///
/// Construct one per session; clones share the same session. The whole
/// client surface lives in methods on this type:
///
/// - connection lifecycle: [`connect`](Self::connect),
///   [`disconnect`](Self::disconnect), [`leave`](Self::leave),
///   [`reconnect_with_backoff`](Self::reconnect_with_backoff)
/// - actions: [`send_action`](Self::send_action),
///   [`process_queued_actions`](Self::process_queued_actions),
///   [`handle_validation_failure`](Self::handle_validation_failure)
/// - state: [`request_state_sync`](Self::request_state_sync),
///   [`apply_state_diff`](Self::apply_state_diff),
///   [`get_current_state`](Self::get_current_state),
///   [`get_connection_state`](Self::get_connection_state),
///   [`set_connection_state`](Self::set_connection_state)
/// - observers: [`on_game_action`](Self::on_game_action),
///   [`on_state_sync`](Self::on_state_sync), [`on_conflict`](Self::on_conflict)
pub struct SyncService<C: Connector, V: Validator, S: KeyValueStore> {
    pub(crate) inner: Arc<Inner<C, V, S>>,
}

impl<C: Connector, V: Validator, S: KeyValueStore> Clone for SyncService<C, V, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector, V: Validator, S: KeyValueStore> SyncService<C, V, S> {
    /// Creates a disconnected service.
    ///
    /// Whatever the offline queue persisted in `store` under
    /// `config.queue.storage_key` is loaded now and replayed on the first
    /// successful connect.
    pub fn new(connector: C, validator: V, store: S, config: SyncConfig) -> Self {
        let config = config.validated();
        let queue = OfflineActionQueue::load(store, config.queue.clone());
        let shared = Shared {
            session: None,
            store: VersionedSessionStore::new(config.rollback_capacity),
            queue,
            connection: ConnectionState::default(),
            link: LinkState::Idle,
            backoff: Backoff::new(config.backoff.clone()),
            monitor: LivenessMonitor::new(config.heartbeat.clone(), Instant::now()),
            generation: 0,
            sync_waiters: Vec::new(),
            tasks: Tasks::new(),
        };

        Self {
            inner: Arc::new(Inner {
                connector,
                validation: RemoteValidationClient::new(validator, config.validation_timeout),
                codec: JsonCodec,
                dispatcher: EventDispatcher::new(),
                ops: tokio::sync::Mutex::new(()),
                shared: Mutex::new(shared),
                config,
            }),
        }
    }

    // =====================================================================
    // Connection lifecycle
    // =====================================================================

    /// Opens the room channel, subscribes, and starts heartbeats.
    ///
    /// On success the backoff counter resets and the offline queue is
    /// replayed. On failure the service schedules backoff retries in the
    /// background and returns the error of this first attempt; later
    /// retries are never reported here.
    ///
    /// Supersedes any previous connection or pending retry of this
    /// service.
    pub async fn connect(&self, room_id: RoomId, actor_id: ActorId) -> Result<(), SyncError> {
        let old_channel = {
            let mut shared = self.lock();
            if let Some(handle) = shared.tasks.reconnect.take() {
                handle.abort();
            }
            shared.generation += 1;
            shared.backoff.reset();
            shared.transition(LinkState::Idle);
            shared.session = Some(Session {
                room_id: room_id.clone(),
                actor_id: actor_id.clone(),
            });
            shared.tasks.take_channel()
        };
        if let Some(channel) = old_channel {
            release(&*channel).await;
        }

        info!(%room_id, %actor_id, "connecting");
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(%room_id, error = %e, "connect failed");
                self.reconnect_with_backoff();
                Err(e)
            }
        }
    }

    /// Starts the background reconnection loop.
    ///
    /// No-op while a reconnection is already running, or before the
    /// first `connect`. Waits `min(base · 2^attempt, max)` before each
    /// retry; once the attempts run out, emits
    /// [`ConflictEvent::ConnectionLost`] once and stops.
    pub fn reconnect_with_backoff(&self) {
        let mut shared = self.lock();
        if shared.link.is_reconnecting() {
            debug!("reconnection already in progress");
            return;
        }
        if shared.session.is_none() {
            debug!("no session to reconnect");
            return;
        }
        if shared.link == LinkState::Failed {
            // An explicit retry after giving up starts a fresh schedule.
            shared.backoff.reset();
        }
        let attempt = shared.backoff.attempt();
        shared.transition(LinkState::Reconnecting { attempt });

        let service = self.clone();
        shared.tasks.reconnect = Some(tokio::spawn(async move {
            service.run_reconnect().await;
        }));
    }

    /// Stops every timer, unsubscribes, and marks the service
    /// disconnected. The snapshot and queue are kept. Idempotent.
    pub async fn disconnect(&self) {
        let channel = {
            let mut shared = self.lock();
            shared.generation += 1;
            if let Some(handle) = shared.tasks.reconnect.take() {
                handle.abort();
            }
            shared.sync_waiters.clear();
            shared.transition(LinkState::Idle);
            shared.tasks.take_channel()
        };

        if let Some(channel) = channel {
            release(&*channel).await;
            info!("disconnected");
        }
    }

    /// Disconnects and forgets the session: snapshot, rollback entries,
    /// queued actions (persisted copy included) and connection state.
    pub async fn leave(&self) {
        self.disconnect().await;
        let mut shared = self.lock();
        if let Some(session) = shared.session.take() {
            info!(room_id = %session.room_id, "left room");
        }
        shared.store.reset();
        shared.queue.clear();
        shared.backoff.reset();
        shared.connection = ConnectionState::default();
    }

    // =====================================================================
    // State
    // =====================================================================

    /// Asks the authority for its current state and waits for the next
    /// `state_sync`, bounded by `state_sync_timeout`.
    ///
    /// The inbound sync is applied like any other before this returns.
    ///
    /// # Errors
    /// - [`SyncError::NoSession`] / [`SyncError::NotConnected`] without
    ///   an open channel.
    /// - [`SyncError::Timeout`] if no sync arrives in time.
    pub async fn request_state_sync(&self) -> Result<StateSyncPayload, SyncError> {
        let (tx, rx) = oneshot::channel();
        let request = {
            let mut shared = self.lock();
            let session = shared.session.as_ref().ok_or(SyncError::NoSession)?;
            let request = RequestStateSyncPayload {
                room_id: session.room_id.clone(),
                last_version: shared.store.version().unwrap_or(0),
            };
            shared.sync_waiters.retain(|w| !w.is_closed());
            shared.sync_waiters.push(tx);
            request
        };

        self.broadcast(&request).await?;
        debug!(last_version = request.last_version, "state sync requested");

        let timeout = self.inner.config.state_sync_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(sync)) => Ok(sync),
            Ok(Err(_)) => Err(SyncError::NotConnected),
            Err(_) => Err(SyncError::Timeout(timeout, "state_sync")),
        }
    }

    /// Authoritative overwrite from outside the channel.
    ///
    /// Replaces the snapshot with `server_state`, clears every rollback
    /// entry, and makes the offline queue exactly the actions of
    /// `queued_actions` newer than `server_state.last_modified`, which it
    /// also returns.
    pub async fn apply_state_diff(
        &self,
        server_state: SessionSnapshot,
        queued_actions: Vec<Action>,
    ) -> Vec<Action> {
        let _op = self.inner.ops.lock().await;
        let mut shared = self.lock();
        let retained = shared.store.apply_state_diff(server_state, queued_actions);
        shared.queue.replace(retained.clone());
        retained
    }

    pub fn get_current_state(&self) -> Option<SessionSnapshot> {
        self.lock().store.current_state().cloned()
    }

    pub fn get_connection_state(&self) -> ConnectionState {
        self.lock().connection_state()
    }

    /// Applies a partial update to the connection state.
    ///
    /// `queued_actions`, when given, replaces the offline queue (and its
    /// persisted copy).
    pub fn set_connection_state(&self, mut patch: ConnectionStatePatch) {
        let mut shared = self.lock();
        if let Some(actions) = patch.queued_actions.take() {
            shared.queue.replace(actions);
        }
        shared.patch_connection(patch);
    }

    /// Whether `action_id` still awaits the authority: it has a rollback
    /// entry or sits in the offline queue.
    pub fn is_pending(&self, action_id: &ActionId) -> bool {
        let shared = self.lock();
        shared.store.rollbacks().contains(action_id) || shared.queue.contains(action_id)
    }

    /// Where the link state machine currently stands.
    pub fn link_state(&self) -> LinkState {
        self.lock().link
    }

    // =====================================================================
    // Observers
    // =====================================================================

    pub fn on_game_action(
        &self,
        observer: impl Fn(&GameActionPayload) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.dispatcher.on_game_action(observer)
    }

    pub fn on_state_sync(
        &self,
        observer: impl Fn(&StateSyncPayload) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.dispatcher.on_state_sync(observer)
    }

    pub fn on_conflict(
        &self,
        observer: impl Fn(&ConflictEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.dispatcher.on_conflict(observer)
    }

    // =====================================================================
    // Internals
    // =====================================================================

    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared<C::Channel, S>> {
        // The guarded data is plain bookkeeping; a panic elsewhere while
        // holding it leaves nothing half-written worth refusing.
        self.inner.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Encodes `payload` and sends it on the current channel.
    pub(crate) async fn broadcast<P: WireEvent>(&self, payload: &P) -> Result<(), SyncError> {
        let channel = self
            .lock()
            .tasks
            .channel
            .clone()
            .ok_or(SyncError::NotConnected)?;
        let bytes = self.inner.codec.encode(payload)?;
        channel.send(P::NAME, &bytes).await?;
        trace!(event = P::NAME, bytes = bytes.len(), "broadcast");
        Ok(())
    }

    /// One connection attempt: open, subscribe, start tasks, replay.
    async fn establish(&self) -> Result<(), SyncError> {
        let session = self.lock().session.clone().ok_or(SyncError::NoSession)?;

        let channel = self.inner.connector.open(&session.room_id.topic()).await?;
        channel.subscribe().await?;
        let channel = Arc::new(channel);

        {
            let mut shared = self.lock();
            shared.generation += 1;
            let generation = shared.generation;
            shared.backoff.reset();
            shared.monitor.reset(Instant::now());
            shared.transition(LinkState::Connected);
            shared.patch_connection(ConnectionStatePatch {
                last_heartbeat: Some(now_millis()),
                missed_heartbeats: Some(0),
                ..ConnectionStatePatch::default()
            });

            if let Some(stale) = shared.tasks.take_channel() {
                // Only a superseded attempt can leave one behind.
                debug!(channel = %stale.id(), "dropping superseded channel");
            }
            shared.tasks.channel = Some(Arc::clone(&channel));

            let service = self.clone();
            let pump_channel = Arc::clone(&channel);
            shared.tasks.pump = Some(tokio::spawn(async move {
                service.run_pump(generation, pump_channel).await;
            }));

            let service = self.clone();
            shared.tasks.heartbeat = Some(tokio::spawn(async move {
                service.run_heartbeat(generation).await;
            }));
        }

        info!(
            room_id = %session.room_id,
            actor_id = %session.actor_id,
            channel = %channel.id(),
            "connected"
        );

        self.process_queued_actions().await;
        Ok(())
    }

    async fn run_reconnect(&self) {
        let stale = self.lock().tasks.take_channel();
        if let Some(channel) = stale {
            release(&*channel).await;
        }

        loop {
            let (delay, attempt) = {
                let shared = self.lock();
                (shared.backoff.next_delay(), shared.backoff.attempt())
            };
            let Some(delay) = delay else {
                self.give_up(attempt);
                return;
            };

            info!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "reconnecting"
            );
            tokio::time::sleep(delay).await;

            match self.establish().await {
                Ok(()) => return,
                Err(e) => {
                    let mut shared = self.lock();
                    shared.backoff.record_failure();
                    let attempt = shared.backoff.attempt();
                    warn!(attempt, error = %e, "reconnect attempt failed");
                    if !shared.backoff.is_exhausted() {
                        shared.transition(LinkState::Reconnecting { attempt });
                    }
                }
            }
        }
    }

    fn give_up(&self, attempts: u32) {
        {
            let mut shared = self.lock();
            shared.transition(LinkState::Failed);
            shared.tasks.reconnect = None;
            shared.sync_waiters.clear();
        }
        warn!(attempts, "reconnection attempts exhausted");
        self.inner
            .dispatcher
            .emit_conflict(&ConflictEvent::ConnectionLost(ConnectionLostPayload {
                reason: format!("reconnection failed after {attempts} attempts"),
            }));
    }

    /// Sends a heartbeat every interval and checks liveness after each.
    async fn run_heartbeat(&self, generation: u64) {
        let interval = self.inner.config.heartbeat.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

        loop {
            ticker.tick().await;

            let actor_id = {
                let shared = self.lock();
                if shared.generation != generation {
                    return;
                }
                match &shared.session {
                    Some(session) => session.actor_id.clone(),
                    None => return,
                }
            };

            let heartbeat = HeartbeatPayload {
                player_id: actor_id,
                timestamp: now_millis(),
            };
            if let Err(e) = self.broadcast(&heartbeat).await {
                debug!(error = %e, "heartbeat send failed");
            }

            let liveness = {
                let mut shared = self.lock();
                if shared.generation != generation {
                    return;
                }
                let liveness = shared.monitor.check(Instant::now());
                let missed = shared.monitor.missed_heartbeats();
                shared.patch_connection(ConnectionStatePatch {
                    missed_heartbeats: Some(missed),
                    ..ConnectionStatePatch::default()
                });
                if let Liveness::Suspect { .. } = liveness {
                    shared.transition(LinkState::Suspect);
                }
                liveness
            };

            match liveness {
                Liveness::Alive => trace!("heartbeat tick"),
                Liveness::Suspect { silent_for } => {
                    warn!(
                        silent_ms = silent_for.as_millis() as u64,
                        "no heartbeat from peers; reconnecting"
                    );
                    self.reconnect_with_backoff();
                    return;
                }
            }
        }
    }

    /// Called by the pump when its channel ends.
    pub(crate) fn channel_lost(&self, generation: u64) {
        if self.lock().generation != generation {
            return;
        }
        self.reconnect_with_backoff();
    }
}

/// Best-effort unsubscribe.
async fn release<Ch: Channel>(channel: &Ch) {
    if let Err(e) = channel.unsubscribe().await {
        debug!(channel = %channel.id(), error = %e, "unsubscribe failed");
    }
}
