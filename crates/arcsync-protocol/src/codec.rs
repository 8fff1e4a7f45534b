//! Codec trait and the JSON implementation.
//!
//! A codec converts between Rust values and raw bytes. Everything above
//! the transport talks in typed payloads and hands a codec the job of
//! producing bytes, so the wire format can change without touching the
//! synchronization logic.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because the codec is shared between the
/// caller's tasks and the background inbound pump.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or
    /// don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// JSON is what browser clients and the authority speak on room
/// channels, and it is what the offline queue is persisted as.
///
/// ```rust
/// use arcsync_protocol::{Codec, HeartbeatPayload, ActorId, JsonCodec};
///
/// let codec = JsonCodec;
/// let hb = HeartbeatPayload { player_id: ActorId::new("alice"), timestamp: 5000 };
///
/// let bytes = codec.encode(&hb).unwrap();
/// let decoded: HeartbeatPayload = codec.decode(&bytes).unwrap();
/// assert_eq!(hb, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
