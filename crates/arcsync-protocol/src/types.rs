//! Core data model shared by every Arcsync layer.
//!
//! These are the values a client keeps in memory and exchanges with the
//! authority: who is acting ([`ActorId`]), where ([`RoomId`]), what they
//! did ([`Action`]), and the versioned game state the action applies to
//! ([`SessionSnapshot`]).
//!
//! Game rules never live here. Payloads are opaque `serde_json::Value`s
//! that only the game layer interprets.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch.
///
/// Actions and snapshots carry wall-clock timestamps because they are
/// compared across devices (an action is "already reflected" in a
/// snapshot when its timestamp is not newer than `last_modified`).
pub type Millis = u64;

/// Current wall-clock time in milliseconds.
///
/// Falls back to 0 if the system clock is set before 1970, which keeps
/// this infallible for callers.
pub fn now_millis() -> Millis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Millis)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies a participant (a player's client) in a session.
///
/// Newtype over `String` so an actor can never be passed where a room is
/// expected. `#[serde(transparent)]` keeps the wire form a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies the room (one game instance) a session is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The channel topic this room's traffic is published on.
    pub fn topic(&self) -> String {
        format!("room:{}", self.0)
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collision-resistant identity of an [`Action`].
///
/// Assigned once when the action is created and never derived from the
/// action's contents, so two actions with the same kind and timestamp
/// still have distinct identities. The value is a 32-character lowercase
/// hex string (128 random bits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Wraps an existing id, e.g. one received from a peer.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// SessionSnapshot
// ---------------------------------------------------------------------------

/// The full, versioned game-session state.
///
/// Snapshots are values: a component that wants to change the session
/// builds a new snapshot and swaps it in whole. No field is ever mutated
/// in place on the shared copy, so an interleaved async step can never
/// observe a half-applied update.
///
/// ```text
/// version 4 ──(optimistic action)──→ version 5 ──(state_sync v7)──→ version 7
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Monotonically non-decreasing across the session lifetime, except
    /// when an authoritative overwrite replaces it.
    pub version: u64,
    /// When this snapshot was produced.
    pub last_modified: Millis,
    /// Who produced it.
    pub last_modified_by: ActorId,
    /// Game-specific state. Opaque to this layer.
    pub payload: serde_json::Value,
}

impl SessionSnapshot {
    /// A version-0 snapshot, typically built from the initial sync.
    pub fn initial(actor_id: ActorId, payload: serde_json::Value) -> Self {
        Self {
            version: 0,
            last_modified: now_millis(),
            last_modified_by: actor_id,
            payload,
        }
    }

    /// Returns a copy of this snapshot with a different payload. The
    /// version metadata is left untouched.
    pub fn with_payload(&self, payload: serde_json::Value) -> Self {
        Self {
            payload,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Something an actor did, proposed to the authority.
///
/// Immutable once built. Identity for bookkeeping (rollback entries,
/// queue entries, authority confirmations) is [`Action::id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: ActionId,
    /// Game-defined action type ("play_card", "bid", ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub actor_id: ActorId,
    pub payload: serde_json::Value,
    pub timestamp: Millis,
}

impl Action {
    /// Creates an action stamped with the current wall-clock time and a
    /// freshly generated id.
    pub fn new(
        kind: impl Into<String>,
        actor_id: ActorId,
        payload: serde_json::Value,
    ) -> Self {
        Self::at(kind, actor_id, payload, now_millis())
    }

    /// Creates an action with an explicit timestamp.
    pub fn at(
        kind: impl Into<String>,
        actor_id: ActorId,
        payload: serde_json::Value,
        timestamp: Millis,
    ) -> Self {
        Self {
            id: ActionId::generate(),
            kind: kind.into(),
            actor_id,
            payload,
            timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Connectivity as seen by one client process.
///
/// Exactly one live instance exists per session. Readers always get a
/// copy; writers replace the whole value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_reconnecting: bool,
    /// Wall-clock time of the last heartbeat received from another actor.
    pub last_heartbeat: Millis,
    pub missed_heartbeats: u32,
    /// Actions waiting to be sent, in enqueue order.
    pub queued_actions: Vec<Action>,
}

impl ConnectionState {
    /// Returns a new state with every `Some` field of `patch` applied.
    pub fn patched(&self, patch: ConnectionStatePatch) -> Self {
        Self {
            is_connected: patch.is_connected.unwrap_or(self.is_connected),
            is_reconnecting: patch
                .is_reconnecting
                .unwrap_or(self.is_reconnecting),
            last_heartbeat: patch.last_heartbeat.unwrap_or(self.last_heartbeat),
            missed_heartbeats: patch
                .missed_heartbeats
                .unwrap_or(self.missed_heartbeats),
            queued_actions: patch
                .queued_actions
                .unwrap_or_else(|| self.queued_actions.clone()),
        }
    }
}

/// A partial update to [`ConnectionState`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStatePatch {
    pub is_connected: Option<bool>,
    pub is_reconnecting: Option<bool>,
    pub last_heartbeat: Option<Millis>,
    pub missed_heartbeats: Option<u32>,
    pub queued_actions: Option<Vec<Action>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn actor(id: &str) -> ActorId {
        ActorId::new(id)
    }

    #[test]
    fn test_action_id_generate_is_32_hex_chars() {
        let id = ActionId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_action_same_kind_and_timestamp_get_distinct_ids() {
        let a = Action::at("play", actor("alice"), json!({}), 1000);
        let b = Action::at("play", actor("alice"), json!({}), 1000);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_action_serializes_kind_as_type() {
        let a = Action::at("bid", actor("alice"), json!({"n": 3}), 42);
        let value = serde_json::to_value(&a).unwrap();
        assert_eq!(value["type"], "bid");
        assert_eq!(value["actorId"], "alice");
        assert_eq!(value["timestamp"], 42);
    }

    #[test]
    fn test_snapshot_uses_camel_case_on_the_wire() {
        let snap = SessionSnapshot {
            version: 3,
            last_modified: 10,
            last_modified_by: actor("bob"),
            payload: json!(null),
        };
        let value = serde_json::to_value(&snap).unwrap();
        assert_eq!(value["lastModified"], 10);
        assert_eq!(value["lastModifiedBy"], "bob");
    }

    #[test]
    fn test_room_topic_is_prefixed() {
        assert_eq!(RoomId::new("42").topic(), "room:42");
    }

    #[test]
    fn test_connection_state_patched_only_touches_given_fields() {
        let state = ConnectionState {
            is_connected: true,
            last_heartbeat: 500,
            ..Default::default()
        };

        let next = state.patched(ConnectionStatePatch {
            is_reconnecting: Some(true),
            ..Default::default()
        });

        assert!(next.is_connected);
        assert!(next.is_reconnecting);
        assert_eq!(next.last_heartbeat, 500);
        // The original is a value and stays untouched.
        assert!(!state.is_reconnecting);
    }
}
