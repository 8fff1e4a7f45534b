//! Integration tests for optimistic sends, rollback, the offline queue,
//! and inbound authority events.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcsync::prelude::*;
use arcsync_protocol::wire::{CONFLICT_DETECTED, GAME_ACTION, STATE_SYNC};
use arcsync_protocol::WireEvent;
use arcsync_transport::{
    ChannelId, Frame, MemoryChannel, MemoryConnector, TransportError,
};
use serde_json::json;
use tokio::time::Instant;

// =========================================================================
// Scripted validator
// =========================================================================

/// Answers from a script, then accepts everything. `Err(status)` entries
/// simulate the validation service failing.
#[derive(Clone, Default)]
struct ScriptedValidator {
    script: Arc<Mutex<VecDeque<Result<ValidationVerdict, u16>>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedValidator {
    fn then(self, answer: Result<ValidationVerdict, u16>) -> Self {
        self.script.lock().unwrap().push_back(answer);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Validator for ScriptedValidator {
    async fn validate(
        &self,
        _request: &ValidationRequest,
    ) -> Result<ValidationVerdict, ValidationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(verdict)) => Ok(verdict),
            Some(Err(status)) => Err(ValidationError::Status(status)),
            None => Ok(ValidationVerdict::accept()),
        }
    }
}

// =========================================================================
// Slow transport
// =========================================================================

const SEND_DELAY: Duration = Duration::from_millis(10);

/// Hub channels whose sends take [`SEND_DELAY`] to complete.
struct SlowConnector(MemoryConnector);

struct SlowChannel(MemoryChannel);

impl Connector for SlowConnector {
    type Channel = SlowChannel;

    async fn open(&self, topic: &str) -> Result<SlowChannel, TransportError> {
        Ok(SlowChannel(self.0.open(topic).await?))
    }
}

impl Channel for SlowChannel {
    async fn subscribe(&self) -> Result<(), TransportError> {
        self.0.subscribe().await
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.0.unsubscribe().await
    }

    async fn send(&self, event: &str, payload: &[u8]) -> Result<(), TransportError> {
        tokio::time::sleep(SEND_DELAY).await;
        self.0.send(event, payload).await
    }

    async fn recv(&self) -> Result<Option<Frame>, TransportError> {
        self.0.recv().await
    }

    fn id(&self) -> ChannelId {
        self.0.id()
    }
}

// =========================================================================
// Helpers
// =========================================================================

type Client = SyncService<MemoryConnector, ScriptedValidator, MemoryStore>;

fn room() -> RoomId {
    RoomId::new("table-1")
}

fn alice() -> ActorId {
    ActorId::new("alice")
}

fn snapshot(version: u64, last_modified: u64) -> SessionSnapshot {
    SessionSnapshot {
        version,
        last_modified,
        last_modified_by: ActorId::new("server"),
        payload: json!({ "turn": version }),
    }
}

fn play(timestamp: u64) -> Action {
    Action::at("play_card", alice(), json!({ "card": "7H" }), timestamp)
}

fn client_with(hub: &MemoryHub, validator: ScriptedValidator, config: SyncConfig) -> Client {
    SyncService::new(hub.connector(), validator, MemoryStore::new(), config)
}

async fn connected(hub: &MemoryHub, validator: ScriptedValidator) -> Client {
    let client = client_with(hub, validator, SyncConfig::default());
    client.connect(room(), alice()).await.unwrap();
    client
}

/// Connected, with an authoritative snapshot at `version` to act on.
async fn seeded(hub: &MemoryHub, validator: ScriptedValidator, version: u64) -> Client {
    let client = connected(hub, validator).await;
    client.apply_state_diff(snapshot(version, 500), vec![]).await;
    client
}

fn inject<P: WireEvent>(hub: &MemoryHub, payload: &P) {
    hub.inject(&room().topic(), P::NAME, serde_json::to_vec(payload).unwrap());
}

fn sent_actions(hub: &MemoryHub) -> Vec<GameActionPayload> {
    hub.sent_events(GAME_ACTION)
        .iter()
        .map(|f| serde_json::from_slice(&f.payload).unwrap())
        .collect()
}

fn record_conflicts(client: &Client) -> Arc<Mutex<Vec<ConflictEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on_conflict(move |event| sink.lock().unwrap().push(event.clone()));
    seen
}

/// Lets the inbound pump handle injected events.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// =========================================================================
// send_action
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_send_action_accepted_broadcasts_with_base_version() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 4).await;
    let action = play(1_000);

    let outcome = client.send_action(action.clone(), Some(snapshot(5, 1_000))).await;

    assert!(outcome.is_success());
    let sent = sent_actions(&hub);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, action);
    assert_eq!(sent[0].version, 4);
    assert!(sent[0].validated);
    assert_eq!(client.get_current_state().unwrap().version, 5);
    assert!(client.is_pending(&action.id));
}

#[tokio::test(start_paused = true)]
async fn test_send_action_without_baseline_is_not_sent() {
    let hub = MemoryHub::new();
    let validator = ScriptedValidator::default();
    let client = connected(&hub, validator.clone()).await;

    let outcome = client.send_action(play(1_000), None).await;

    assert_eq!(outcome, SendOutcome::NoBaseline);
    assert!(sent_actions(&hub).is_empty());
    assert!(client.get_connection_state().queued_actions.is_empty());
    assert_eq!(validator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_action_rejected_is_neither_sent_nor_queued() {
    let hub = MemoryHub::new();
    let validator = ScriptedValidator::default().then(Ok(ValidationVerdict::reject("not your turn")));
    let client = seeded(&hub, validator, 4).await;
    let conflicts = record_conflicts(&client);
    let action = play(1_000);

    let outcome = client.send_action(action.clone(), Some(snapshot(5, 1_000))).await;

    assert_eq!(
        outcome,
        SendOutcome::Rejected {
            reason: "not your turn".into()
        }
    );
    assert!(sent_actions(&hub).is_empty());
    assert!(client.get_connection_state().queued_actions.is_empty());
    assert_eq!(client.get_current_state().unwrap().version, 4);
    assert_eq!(
        conflicts.lock().unwrap().as_slice(),
        &[ConflictEvent::ActionRejected {
            action,
            reason: "not your turn".into()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_handle_validation_failure_restores_baseline_exactly() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 1).await;
    let s1 = client.get_current_state().unwrap();
    let action = play(1_000);

    client.send_action(action.clone(), Some(snapshot(2, 1_000))).await;
    assert_eq!(client.get_current_state().unwrap().version, 2);

    let restored = client.handle_validation_failure(&action, "illegal move");

    assert_eq!(restored.as_ref(), Some(&s1));
    assert_eq!(client.get_current_state(), Some(s1));
    assert!(!client.is_pending(&action.id));
}

#[tokio::test(start_paused = true)]
async fn test_handle_validation_failure_unknown_action_still_reports() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 1).await;
    let conflicts = record_conflicts(&client);

    let restored = client.handle_validation_failure(&play(1_000), "stale");

    assert_eq!(restored, None);
    assert_eq!(client.get_current_state().unwrap().version, 1);
    assert_eq!(conflicts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_send_action_validation_error_queues_then_replays_once() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default().then(Err(503)), 4).await;
    let action = play(1_000);

    let outcome = client.send_action(action.clone(), None).await;

    assert!(outcome.is_queued());
    assert_eq!(client.get_connection_state().queued_actions, vec![action.clone()]);
    assert!(sent_actions(&hub).is_empty());

    let first = client.process_queued_actions().await;
    let second = client.process_queued_actions().await;

    assert_eq!(first.sent, 1);
    assert_eq!(second, ReplaySummary::default());
    let sent = sent_actions(&hub);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].action, action);
    assert!(!sent[0].validated);
}

#[tokio::test(start_paused = true)]
async fn test_send_action_validation_timeout_queues() {
    struct Stalls;

    impl Validator for Stalls {
        async fn validate(
            &self,
            _request: &ValidationRequest,
        ) -> Result<ValidationVerdict, ValidationError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ValidationVerdict::accept())
        }
    }

    let hub = MemoryHub::new();
    let client = SyncService::new(hub.connector(), Stalls, MemoryStore::new(), SyncConfig::default());
    client.connect(room(), alice()).await.unwrap();
    client.apply_state_diff(snapshot(1, 500), vec![]).await;

    let outcome = client.send_action(play(1_000), None).await;

    assert!(outcome.is_queued());
}

#[tokio::test(start_paused = true)]
async fn test_send_action_send_failure_falls_back_to_queue() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 4).await;
    hub.fail_next_sends(1);

    let outcome = client.send_action(play(1_000), Some(snapshot(5, 1_000))).await;

    assert!(outcome.is_queued());
    assert_eq!(client.get_connection_state().queued_actions.len(), 1);
    // The optimistic state stays adopted while the action waits.
    assert_eq!(client.get_current_state().unwrap().version, 5);
}

#[tokio::test(start_paused = true)]
async fn test_send_action_validation_disabled_skips_validator() {
    let hub = MemoryHub::new();
    let validator = ScriptedValidator::default().then(Ok(ValidationVerdict::reject("no")));
    let config = SyncConfig {
        validation_enabled: false,
        ..SyncConfig::default()
    };
    let client = client_with(&hub, validator.clone(), config);
    client.connect(room(), alice()).await.unwrap();
    client.apply_state_diff(snapshot(1, 500), vec![]).await;

    let outcome = client.send_action(play(1_000), None).await;

    assert!(outcome.is_success());
    assert_eq!(validator.calls(), 0);
    assert!(sent_actions(&hub)[0].validated);
}

// =========================================================================
// Offline queue
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_offline_sends_are_queued_and_replayed_on_reconnect() {
    let hub = MemoryHub::new();
    let client = connected(&hub, ScriptedValidator::default()).await;
    client.disconnect().await;

    let a1 = client.send_action(play(1_000), None).await;
    let a2 = client.send_action(play(2_000), None).await;

    assert!(a1.is_queued() && a2.is_queued());
    assert_eq!(client.get_connection_state().queued_actions.len(), 2);

    client.connect(room(), alice()).await.unwrap();

    assert_eq!(sent_actions(&hub).len(), 2);
    assert!(client.get_connection_state().queued_actions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_replay_preserves_enqueue_order() {
    let hub = MemoryHub::new();
    let client = client_with(&hub, ScriptedValidator::default(), SyncConfig::default());

    for ts in [1_000, 2_000, 3_000] {
        assert!(client.send_action(play(ts), None).await.is_queued());
    }
    client.connect(room(), alice()).await.unwrap();

    let timestamps: Vec<u64> = sent_actions(&hub).iter().map(|p| p.action.timestamp).collect();
    assert_eq!(timestamps, vec![1_000, 2_000, 3_000]);
}

#[tokio::test(start_paused = true)]
async fn test_offline_send_adopts_optimistic_state() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 3).await;
    client.disconnect().await;
    let action = play(1_000);

    let outcome = client.send_action(action.clone(), Some(snapshot(4, 1_000))).await;

    assert_eq!(outcome.optimistic_state().map(|s| s.version), Some(4));
    assert_eq!(client.get_current_state().unwrap().version, 4);

    client.handle_validation_failure(&action, "refused on replay");
    assert_eq!(client.get_current_state().unwrap().version, 3);
}

#[tokio::test(start_paused = true)]
async fn test_process_queued_actions_empty_queue_sends_nothing() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 1).await;
    let before = client.get_connection_state();

    let summary = client.process_queued_actions().await;

    assert_eq!(summary, ReplaySummary::default());
    assert!(hub.sent_events(GAME_ACTION).is_empty());
    assert_eq!(client.get_connection_state(), before);
}

#[tokio::test(start_paused = true)]
async fn test_process_queued_actions_while_disconnected_is_noop() {
    let hub = MemoryHub::new();
    let client = client_with(&hub, ScriptedValidator::default(), SyncConfig::default());
    client.send_action(play(1_000), None).await;

    let summary = client.process_queued_actions().await;

    assert_eq!(summary, ReplaySummary::default());
    assert_eq!(client.get_connection_state().queued_actions.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_replay_requeued_then_dropped_after_max_retries() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default().then(Err(503)), 1).await;
    let conflicts = record_conflicts(&client);
    let action = play(1_000);
    client.send_action(action.clone(), None).await;

    for attempt in 1..=2 {
        hub.fail_next_sends(1);
        let summary = client.process_queued_actions().await;
        assert_eq!(summary.requeued, 1, "attempt {attempt}");
        assert_eq!(client.get_connection_state().queued_actions, vec![action.clone()]);
    }

    hub.fail_next_sends(1);
    let summary = client.process_queued_actions().await;

    assert_eq!(summary.dropped, 1);
    assert!(client.get_connection_state().queued_actions.is_empty());
    assert_eq!(
        conflicts.lock().unwrap().as_slice(),
        &[ConflictEvent::ActionDropped { action, retries: 3 }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_replay_keeps_original_position() {
    let hub = MemoryHub::new();
    let validator = ScriptedValidator::default().then(Err(503)).then(Err(503));
    let client = seeded(&hub, validator, 1).await;
    client.send_action(play(1_000), None).await;
    client.send_action(play(2_000), None).await;

    // First entry fails, second goes through.
    hub.fail_next_sends(1);
    let summary = client.process_queued_actions().await;

    assert_eq!(summary.sent, 1);
    assert_eq!(summary.requeued, 1);
    let queued = client.get_connection_state().queued_actions;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].timestamp, 1_000);
}

#[tokio::test(start_paused = true)]
async fn test_queue_survives_restart() {
    let hub = MemoryHub::new();
    let store = MemoryStore::new();
    let first = SyncService::new(hub.connector(), AcceptAll, store.clone(), SyncConfig::default());
    first.send_action(play(1_000), None).await;
    first.send_action(play(2_000), None).await;
    drop(first);

    let second = SyncService::new(hub.connector(), AcceptAll, store, SyncConfig::default());
    assert_eq!(second.get_connection_state().queued_actions.len(), 2);

    second.connect(room(), alice()).await.unwrap();
    assert_eq!(sent_actions(&hub).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_mid_replay_keeps_unsent_actions() {
    let hub = MemoryHub::new();
    let store = MemoryStore::new();
    let client = SyncService::new(
        SlowConnector(hub.connector()),
        AcceptAll,
        store.clone(),
        SyncConfig::default(),
    );
    for ts in [1_000, 2_000, 3_000] {
        assert!(client.send_action(play(ts), None).await.is_queued());
    }

    hub.set_online(false);
    let start = Instant::now();
    assert!(client.connect(room(), alice()).await.is_err());
    hub.set_online(true);

    // The first retry connects at 1000ms; by 1015ms one send has landed
    // and the second is in flight.
    tokio::time::sleep_until(start + Duration::from_millis(1_015)).await;
    client.disconnect().await;

    assert_eq!(sent_actions(&hub).len(), 1);
    let queued: Vec<u64> = client
        .get_connection_state()
        .queued_actions
        .iter()
        .map(|a| a.timestamp)
        .collect();
    assert_eq!(queued, vec![2_000, 3_000]);

    let restarted = SyncService::new(hub.connector(), AcceptAll, store, SyncConfig::default());
    assert_eq!(restarted.get_connection_state().queued_actions.len(), 2);

    client.connect(room(), alice()).await.unwrap();
    let timestamps: Vec<u64> = sent_actions(&hub).iter().map(|p| p.action.timestamp).collect();
    assert_eq!(timestamps, vec![1_000, 2_000, 3_000]);
    assert!(client.get_connection_state().queued_actions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_replay_persists_retry_count() {
    let hub = MemoryHub::new();
    let store = MemoryStore::new();
    let client = SyncService::new(hub.connector(), AcceptAll, store.clone(), SyncConfig::default());
    client.send_action(play(1_000), None).await;
    hub.fail_next_sends(1);

    client.connect(room(), alice()).await.unwrap();

    let blob = store.get("arcsync:offline-queue").unwrap().expect("still queued");
    let persisted: Vec<arcsync_queue::QueuedAction> = serde_json::from_str(&blob).unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].retry_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_overflow_drops_and_reports() {
    let hub = MemoryHub::new();
    let mut config = SyncConfig::default();
    config.queue.max_len = 1;
    let client = client_with(&hub, ScriptedValidator::default(), config);
    let conflicts = record_conflicts(&client);

    client.send_action(play(1_000), None).await;
    let outcome = client.send_action(play(2_000), None).await;

    assert_eq!(outcome, SendOutcome::Dropped);
    assert_eq!(client.get_connection_state().queued_actions.len(), 1);
    assert!(matches!(
        conflicts.lock().unwrap()[0],
        ConflictEvent::ActionDropped { retries: 0, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_set_connection_state_replaces_queue() {
    let hub = MemoryHub::new();
    let client = client_with(&hub, ScriptedValidator::default(), SyncConfig::default());
    client.send_action(play(1_000), None).await;

    client.set_connection_state(ConnectionStatePatch {
        queued_actions: Some(vec![play(5_000)]),
        missed_heartbeats: Some(2),
        ..ConnectionStatePatch::default()
    });

    let state = client.get_connection_state();
    assert_eq!(state.queued_actions.len(), 1);
    assert_eq!(state.queued_actions[0].timestamp, 5_000);
    assert_eq!(state.missed_heartbeats, 2);
}

// =========================================================================
// apply_state_diff
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_apply_state_diff_keeps_only_newer_queued_actions() {
    let hub = MemoryHub::new();
    let client = client_with(&hub, ScriptedValidator::default(), SyncConfig::default());
    let queued = vec![play(1_000), play(2_000), play(3_000)];

    let retained = client.apply_state_diff(snapshot(9, 2_000), queued.clone()).await;

    assert_eq!(retained, vec![queued[2].clone()]);
    assert_eq!(client.get_connection_state().queued_actions, retained);
    assert_eq!(client.get_current_state().unwrap().version, 9);
}

// =========================================================================
// Inbound events
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_inbound_state_sync_resets_pending_work() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default().then(Err(503)), 1).await;
    let syncs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&syncs);
    client.on_state_sync(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let action = play(1_000);
    client.send_action(action.clone(), Some(snapshot(2, 1_000))).await;
    assert!(client.is_pending(&action.id));

    inject(
        &hub,
        &StateSyncPayload {
            state: snapshot(7, 4_000),
            version: 7,
        },
    );
    settle().await;

    assert_eq!(client.get_current_state(), Some(snapshot(7, 4_000)));
    assert!(client.get_connection_state().queued_actions.is_empty());
    assert!(!client.is_pending(&action.id));
    assert_eq!(syncs.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_echo_confirms_pending_action() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 4).await;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    client.on_game_action(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let conflicts = record_conflicts(&client);
    let action = play(1_000);
    client.send_action(action.clone(), Some(snapshot(5, 1_000))).await;

    inject(
        &hub,
        &GameActionPayload {
            action: action.clone(),
            version: 4,
            validated: true,
        },
    );
    settle().await;

    assert!(!client.is_pending(&action.id));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(conflicts.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_inbound_action_on_other_version_reports_conflict() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 5).await;
    let conflicts = record_conflicts(&client);
    let theirs = Action::at("play_card", ActorId::new("bob"), json!({}), 1_500);

    inject(
        &hub,
        &GameActionPayload {
            action: theirs.clone(),
            version: 3,
            validated: true,
        },
    );
    settle().await;

    let events = conflicts.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        ConflictEvent::Detected(payload) => {
            assert_eq!(payload.action, theirs);
            assert_eq!(payload.expected_version, 5);
            assert_eq!(payload.actual_version, 3);
        }
        other => panic!("expected Detected, got {other:?}"),
    }
    // Reporting never touches local state.
    assert_eq!(client.get_current_state().unwrap().version, 5);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_unvalidated_action_is_not_a_conflict() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 5).await;
    let conflicts = record_conflicts(&client);

    inject(
        &hub,
        &GameActionPayload {
            action: Action::at("play_card", ActorId::new("bob"), json!({}), 1_500),
            version: 3,
            validated: false,
        },
    );
    settle().await;

    assert!(conflicts.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_inbound_conflict_detected_forwarded_to_observers() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 5).await;
    let conflicts = record_conflicts(&client);
    let payload = ConflictPayload {
        action: play(1_000),
        reason: "stale version".into(),
        expected_version: 6,
        actual_version: 5,
    };

    hub.inject(&room().topic(), CONFLICT_DETECTED, serde_json::to_vec(&payload).unwrap());
    settle().await;

    assert_eq!(
        conflicts.lock().unwrap().as_slice(),
        &[ConflictEvent::Detected(payload)]
    );
    assert_eq!(client.get_current_state().unwrap().version, 5);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_garbage_and_unknown_events_are_skipped() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 5).await;

    hub.inject(&room().topic(), "shuffle_deck", b"{}".to_vec());
    hub.inject(&room().topic(), STATE_SYNC, b"not json".to_vec());
    inject(
        &hub,
        &StateSyncPayload {
            state: snapshot(6, 9_000),
            version: 6,
        },
    );
    settle().await;

    // The pump survived both and applied the valid sync.
    assert_eq!(client.get_current_state().unwrap().version, 6);
    assert!(client.get_connection_state().is_connected);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_observer_is_not_called() {
    let hub = MemoryHub::new();
    let client = seeded(&hub, ScriptedValidator::default(), 1).await;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let sub = client.on_state_sync(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert!(sub.unsubscribe());
    inject(
        &hub,
        &StateSyncPayload {
            state: snapshot(2, 9_000),
            version: 2,
        },
    );
    settle().await;

    assert_eq!(seen.load(Ordering::SeqCst), 0);
}
