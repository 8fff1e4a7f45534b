//! Broadcast payloads and the closed set of inbound events.
//!
//! Every message on a room channel is a named event plus a payload. The
//! names are fixed strings shared with the authority and other clients,
//! so they live here as constants next to the payload types.
//!
//! Outbound, each payload type knows its own event name through
//! [`WireEvent`]. Inbound, [`ServerEvent::decode`] turns a raw
//! `(name, bytes)` pair into one typed variant.

use serde::{Deserialize, Serialize};

use crate::{Action, ActorId, Codec, Millis, ProtocolError, RoomId, SessionSnapshot};

/// Event name for a game action broadcast.
pub const GAME_ACTION: &str = "game_action";
/// Event name for a liveness heartbeat.
pub const HEARTBEAT: &str = "heartbeat";
/// Event name for a client asking the authority for a full snapshot.
pub const REQUEST_STATE_SYNC: &str = "request_state_sync";
/// Event name for an authoritative full snapshot.
pub const STATE_SYNC: &str = "state_sync";
/// Event name for an authority-detected conflict.
pub const CONFLICT_DETECTED: &str = "conflict_detected";
/// Event name for a lost-connection notice.
pub const CONNECTION_LOST: &str = "connection_lost";

/// A payload type that travels under a fixed event name.
pub trait WireEvent: Serialize {
    const NAME: &'static str;
}

/// `game_action: { action, version, validated }`
///
/// `version` is the session version the action was based on.
/// `validated` is `true` when the sender got an explicit accept before
/// broadcasting and `false` for queued replays, which the authority
/// re-validates on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameActionPayload {
    pub action: Action,
    pub version: u64,
    pub validated: bool,
}

impl WireEvent for GameActionPayload {
    const NAME: &'static str = GAME_ACTION;
}

/// `heartbeat: { playerId, timestamp }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPayload {
    pub player_id: ActorId,
    pub timestamp: Millis,
}

impl WireEvent for HeartbeatPayload {
    const NAME: &'static str = HEARTBEAT;
}

/// `request_state_sync: { roomId, lastVersion }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStateSyncPayload {
    pub room_id: RoomId,
    pub last_version: u64,
}

impl WireEvent for RequestStateSyncPayload {
    const NAME: &'static str = REQUEST_STATE_SYNC;
}

/// `state_sync: { state, version }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSyncPayload {
    pub state: SessionSnapshot,
    pub version: u64,
}

impl WireEvent for StateSyncPayload {
    const NAME: &'static str = STATE_SYNC;
}

/// `conflict_detected: { action, reason, expectedVersion, actualVersion }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictPayload {
    pub action: Action,
    pub reason: String,
    pub expected_version: u64,
    pub actual_version: u64,
}

impl WireEvent for ConflictPayload {
    const NAME: &'static str = CONFLICT_DETECTED;
}

/// `connection_lost: { reason }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionLostPayload {
    pub reason: String,
}

impl WireEvent for ConnectionLostPayload {
    const NAME: &'static str = CONNECTION_LOST;
}

/// Every event a client can receive on a room channel.
///
/// Dispatch over this enum is exhaustive: adding a variant forces every
/// `match` in the client to decide what to do with it.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    GameAction(GameActionPayload),
    StateSync(StateSyncPayload),
    ConflictDetected(ConflictPayload),
    ConnectionLost(ConnectionLostPayload),
    Heartbeat(HeartbeatPayload),
    RequestStateSync(RequestStateSyncPayload),
}

impl ServerEvent {
    /// Decodes a raw inbound event.
    ///
    /// # Errors
    /// - [`ProtocolError::UnknownEvent`] if `name` is not one of the
    ///   event constants in this module.
    /// - [`ProtocolError::Decode`] if the payload doesn't match the shape
    ///   expected for `name`.
    pub fn decode<C: Codec>(
        name: &str,
        data: &[u8],
        codec: &C,
    ) -> Result<Self, ProtocolError> {
        Ok(match name {
            GAME_ACTION => Self::GameAction(codec.decode(data)?),
            STATE_SYNC => Self::StateSync(codec.decode(data)?),
            CONFLICT_DETECTED => Self::ConflictDetected(codec.decode(data)?),
            CONNECTION_LOST => Self::ConnectionLost(codec.decode(data)?),
            HEARTBEAT => Self::Heartbeat(codec.decode(data)?),
            REQUEST_STATE_SYNC => Self::RequestStateSync(codec.decode(data)?),
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        })
    }

    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameAction(_) => GAME_ACTION,
            Self::StateSync(_) => STATE_SYNC,
            Self::ConflictDetected(_) => CONFLICT_DETECTED,
            Self::ConnectionLost(_) => CONNECTION_LOST,
            Self::Heartbeat(_) => HEARTBEAT,
            Self::RequestStateSync(_) => REQUEST_STATE_SYNC,
        }
    }
}
