//! Error types for the protocol layer.
//!
//! Each Arcsync crate defines its own error enum. A `ProtocolError`
//! always means the problem is in turning values into bytes or bytes
//! into values, never in networking or session bookkeeping.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: malformed JSON, missing required fields, or a
    /// payload sent under the wrong event name.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// An inbound event name this client doesn't know.
    ///
    /// Not fatal: the channel carries events from newer clients and
    /// from the authority that older clients simply skip.
    #[error("unknown event: {0}")]
    UnknownEvent(String),
}
