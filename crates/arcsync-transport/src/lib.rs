//! Realtime channel abstraction for Arcsync.
//!
//! Provides the [`Connector`] and [`Channel`] traits that abstract over
//! whatever pub/sub service carries a room's traffic. A channel is scoped
//! to one topic and exposes four primitives: subscribe, unsubscribe,
//! send a named event, and receive the next inbound event.
//!
//! Delivery is assumed at-least-once and possibly reordered. Nothing in
//! this layer retries; the sync service above owns that policy.
//!
//! # Implementations
//!
//! - [`MemoryHub`]: in-process pub/sub with fault injection, for demos
//!   and tests
//! - `websocket` (default feature): [`WebSocketConnector`] via
//!   `tokio-tungstenite`

mod error;
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use memory::{MemoryChannel, MemoryConnector, MemoryHub, SentFrame};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketChannel, WebSocketConnector};

use std::fmt;
use std::future::Future;

/// Opaque identifier for an open channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Creates a new `ChannelId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chan-{}", self.0)
    }
}

/// One inbound event: its name and encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub payload: Vec<u8>,
}

/// Opens channels. One connector serves every reconnection attempt of a
/// session, so it must be cheap to call repeatedly.
pub trait Connector: Send + Sync + 'static {
    /// The channel type produced by this connector.
    type Channel: Channel;

    /// Opens (but does not subscribe) a channel scoped to `topic`.
    fn open(
        &self,
        topic: &str,
    ) -> impl Future<Output = Result<Self::Channel, TransportError>> + Send;
}

/// A topic-scoped pub/sub channel.
///
/// All methods take `&self`: the sync service sends from caller tasks
/// while a background task sits in [`recv`](Channel::recv), so
/// implementations handle their own interior locking.
pub trait Channel: Send + Sync + 'static {
    /// Joins the topic. Events sent before this resolves may be missed.
    fn subscribe(
        &self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Leaves the topic. After this, `recv` returns `Ok(None)`.
    fn unsubscribe(
        &self,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Broadcasts a named event to the other members of the topic.
    fn send(
        &self,
        event: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next event from the topic.
    ///
    /// Returns `Ok(None)` once the channel is closed, cleanly or not.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Frame>, TransportError>> + Send;

    /// Returns the unique identifier for this channel.
    fn id(&self) -> ChannelId;
}
