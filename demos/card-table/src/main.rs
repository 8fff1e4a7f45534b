//! Two players at a card table, synchronized through an in-process hub.
//!
//! A small dealer task plays the authority: it answers state sync
//! requests, applies legal plays and broadcasts the new snapshot. The
//! players validate locally first, apply their plays optimistically and
//! keep playing through a short outage.
//!
//! Run with `RUST_LOG=debug` to watch the queue and reconnect machinery.

use std::error::Error;
use std::time::Duration;

use arcsync::prelude::*;
use arcsync_protocol::{
    now_millis, Codec, GameActionPayload, JsonCodec, ServerEvent, WireEvent,
};
use arcsync_transport::MemoryChannel;
use serde_json::{json, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn Error + Send + Sync>;

// ---------------------------------------------------------------------------
// Game rules
// ---------------------------------------------------------------------------

/// Applies one play to the table. Players alternate; each play puts a
/// card on the pile.
fn play(state: &SessionSnapshot, action: &Action) -> Result<SessionSnapshot, String> {
    let turn = state.payload["turn"].as_str().unwrap_or_default();
    if action.actor_id.as_str() != turn {
        return Err(format!("it is {turn}'s turn"));
    }
    let card = action.payload["card"]
        .as_str()
        .ok_or_else(|| "a play needs a card".to_string())?;

    let mut pile = state.payload["pile"].as_array().cloned().unwrap_or_default();
    pile.push(Value::from(card));
    let next = if turn == "alice" { "bob" } else { "alice" };

    Ok(SessionSnapshot {
        version: state.version + 1,
        last_modified: action.timestamp,
        last_modified_by: action.actor_id.clone(),
        payload: json!({ "turn": next, "pile": pile }),
    })
}

/// Checks plays against the rules before they leave the client.
struct TableRules;

impl Validator for TableRules {
    async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationVerdict, ValidationError> {
        Ok(match play(&request.session_state, &request.action) {
            Ok(_) => ValidationVerdict::accept(),
            Err(reason) => ValidationVerdict::reject(reason),
        })
    }
}

// ---------------------------------------------------------------------------
// Dealer (authority)
// ---------------------------------------------------------------------------

async fn send<P: WireEvent>(channel: &MemoryChannel, payload: &P) -> Result<(), BoxError> {
    channel.send(P::NAME, &JsonCodec.encode(payload)?).await?;
    Ok(())
}

/// Serves one subscription until the hub drops it.
async fn serve(channel: &MemoryChannel, table: &mut SessionSnapshot) -> Result<(), BoxError> {
    while let Some(frame) = channel.recv().await? {
        let event = match ServerEvent::decode(&frame.event, &frame.payload, &JsonCodec) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "dealer skipped a frame");
                continue;
            }
        };

        match event {
            ServerEvent::RequestStateSync(_) => {}
            ServerEvent::GameAction(payload) => match play(table, &payload.action) {
                Ok(next) => {
                    let echo = GameActionPayload {
                        action: payload.action,
                        version: table.version,
                        validated: true,
                    };
                    send(channel, &echo).await?;
                    *table = next;
                }
                Err(reason) => {
                    let conflict = ConflictPayload {
                        action: payload.action,
                        reason,
                        expected_version: table.version,
                        actual_version: payload.version,
                    };
                    send(channel, &conflict).await?;
                    continue;
                }
            },
            _ => continue,
        }

        let sync = StateSyncPayload {
            state: table.clone(),
            version: table.version,
        };
        send(channel, &sync).await?;
    }
    Ok(())
}

/// Keeps the dealer seated: resubscribes whenever the hub comes back.
async fn run_dealer(hub: MemoryHub, room: RoomId) {
    let mut table = SessionSnapshot {
        version: 1,
        last_modified: now_millis(),
        last_modified_by: ActorId::new("dealer"),
        payload: json!({ "turn": "alice", "pile": [] }),
    };

    loop {
        if let Err(e) = sit_down(&hub, &room, &mut table).await {
            warn!(error = %e, "dealer lost the table");
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn sit_down(hub: &MemoryHub, room: &RoomId, table: &mut SessionSnapshot) -> Result<(), BoxError> {
    let channel = hub.connector().open(&room.topic()).await?;
    channel.subscribe().await?;
    info!("dealer seated");
    serve(&channel, table).await
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

type Player = SyncService<arcsync_transport::MemoryConnector, TableRules, MemoryStore>;

fn seat(hub: &MemoryHub, name: &'static str) -> Player {
    let player = SyncService::new(
        hub.connector(),
        TableRules,
        MemoryStore::new(),
        SyncConfig::default(),
    );
    player.on_state_sync(move |sync| {
        info!(player = name, version = sync.version, table = %sync.state.payload, "table update");
    });
    player.on_conflict(move |event| {
        warn!(player = name, ?event, "conflict");
    });
    player
}

/// Plays `card` optimistically on top of the player's current view.
async fn play_card(player: &Player, name: &str, card: &str) -> SendOutcome {
    let action = Action::new("play_card", ActorId::new(name), json!({ "card": card }));
    let optimistic = player
        .get_current_state()
        .and_then(|state| play(&state, &action).ok());
    let outcome = player.send_action(action, optimistic).await;
    info!(player = name, card, ?outcome, "played");
    outcome
}

async fn pause(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let hub = MemoryHub::new();
    let room = RoomId::new("card-table");
    let dealer = tokio::spawn(run_dealer(hub.clone(), room.clone()));
    pause(10).await;

    let alice = seat(&hub, "alice");
    let bob = seat(&hub, "bob");
    alice.connect(room.clone(), ActorId::new("alice")).await?;
    bob.connect(room.clone(), ActorId::new("bob")).await?;
    alice.request_state_sync().await?;
    bob.request_state_sync().await?;

    play_card(&alice, "alice", "QS").await;
    pause(20).await;
    // Out of turn: refused locally, never reaches the dealer.
    play_card(&alice, "alice", "3C").await;
    play_card(&bob, "bob", "KH").await;
    pause(20).await;

    info!("hub going dark");
    hub.set_online(false);
    pause(20).await;
    play_card(&alice, "alice", "7D").await;
    info!(queued = alice.get_connection_state().queued_actions.len(), "alice waiting");
    hub.set_online(true);

    // First retry fires after one second and replays the queue.
    pause(1_500).await;
    info!(
        alice = ?alice.get_current_state().map(|s| s.payload),
        bob = ?bob.get_current_state().map(|s| s.payload),
        "final table"
    );

    alice.leave().await;
    bob.leave().await;
    dealer.abort();
    Ok(())
}
