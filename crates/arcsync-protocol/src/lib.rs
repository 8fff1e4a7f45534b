//! Data model and wire protocol for Arcsync.
//!
//! This crate defines what clients and the authority exchange:
//!
//! - **Types** ([`SessionSnapshot`], [`Action`], [`ConnectionState`], ids):
//!   the values every other layer reads and replaces.
//! - **Wire** ([`ServerEvent`], the `*Payload` structs, event names):
//!   what travels on a room channel.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how payloads become bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (ServerEvent) → State / Queue / Service
//! ```

mod codec;
mod error;
mod types;
pub mod wire;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    now_millis, Action, ActionId, ActorId, ConnectionState,
    ConnectionStatePatch, Millis, RoomId, SessionSnapshot,
};
pub use wire::{
    ConflictPayload, ConnectionLostPayload, GameActionPayload,
    HeartbeatPayload, RequestStateSyncPayload, ServerEvent,
    StateSyncPayload, WireEvent,
};
