//! # Arcsync
//!
//! Client-side state synchronization for multiplayer game sessions.
//!
//! A remote authority owns the truth; every client keeps a versioned
//! snapshot, applies its own actions optimistically, queues them while
//! offline, and rolls them back when the authority refuses. Arcsync
//! handles the connection lifecycle, heartbeats, backoff reconnection,
//! the offline queue and conflict reporting; the game layer supplies
//! actions and interprets payloads.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use arcsync::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), SyncError> {
//! let hub = MemoryHub::new();
//! let client = SyncService::new(
//!     hub.connector(),
//!     AcceptAll,
//!     MemoryStore::new(),
//!     SyncConfig::default(),
//! );
//!
//! client.on_conflict(|event| eprintln!("conflict: {event:?}"));
//! client.connect(RoomId::new("table-1"), ActorId::new("alice")).await?;
//!
//! let action = Action::new("play_card", ActorId::new("alice"), json!({ "card": "QS" }));
//! let outcome = client.send_action(action, None).await;
//! println!("sent: {}", outcome.is_success());
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod dispatcher;
mod error;
mod inbound;
mod replay;
mod service;
mod validation;

pub use config::SyncConfig;
pub use coordinator::SendOutcome;
pub use dispatcher::{ConflictEvent, EventDispatcher, Subscription};
pub use error::SyncError;
pub use replay::ReplaySummary;
pub use service::SyncService;
pub use validation::{
    AcceptAll, RemoteValidationClient, ValidationError, ValidationOutcome,
    ValidationRequest, ValidationVerdict, Validator,
};

/// Re-exports for the common case.
pub mod prelude {
    pub use crate::{
        AcceptAll, ConflictEvent, ReplaySummary, SendOutcome, Subscription,
        SyncConfig, SyncError, SyncService, ValidationError, ValidationRequest,
        ValidationVerdict, Validator,
    };
    pub use arcsync_liveness::{BackoffConfig, HeartbeatConfig, LinkState};
    pub use arcsync_protocol::{
        Action, ActionId, ActorId, ConflictPayload, ConnectionState,
        ConnectionStatePatch, GameActionPayload, RoomId, SessionSnapshot,
        StateSyncPayload,
    };
    pub use arcsync_queue::{FileStore, KeyValueStore, MemoryStore, QueueConfig};
    pub use arcsync_transport::{Channel, Connector, MemoryHub, WebSocketConnector};
}
