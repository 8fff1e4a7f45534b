//! Versioned session state for Arcsync.
//!
//! This crate holds what a client believes the game session looks like:
//!
//! 1. **The current snapshot**: last authoritative state, possibly with
//!    optimistic local changes on top ([`VersionedSessionStore`])
//! 2. **Rollback bookkeeping**: for every optimistic change, the
//!    snapshot that existed just before it ([`RollbackRegistry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Service (above)   ← decides when to speculate, confirm, or roll back
//!     ↕
//! State (this crate) ← holds snapshots, versions, rollback entries
//!     ↕
//! Protocol (below)  ← SessionSnapshot, Action, ActionId
//! ```
//!
//! Nothing here is async or locked. The service owns one store per
//! session behind its own mutex.

mod error;
mod rollback;
mod store;

pub use error::StateError;
pub use rollback::{RollbackRegistry, DEFAULT_ROLLBACK_CAPACITY};
pub use store::VersionedSessionStore;
