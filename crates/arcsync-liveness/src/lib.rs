//! Liveness and reconnection policy for Arcsync.
//!
//! Three small pieces, each testable without a channel:
//!
//! - [`Backoff`]: how long to wait before the next reconnection attempt,
//!   and when to give up (`min(base · 2^attempt, max)`, bounded attempts)
//! - [`LivenessMonitor`]: whether the link is alive, judged from the
//!   time since another actor's last heartbeat
//! - [`LinkState`]: the explicit `Idle → Connected → Suspect →
//!   Reconnecting → Failed` state machine the connection controller walks
//!
//! # Integration
//!
//! The controller owns one of each and drives them from its timers:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = heartbeat.tick() => {
//!             send_heartbeat().await;
//!             if let Liveness::Suspect { .. } = monitor.check(Instant::now()) {
//!                 link = LinkState::Suspect;
//!                 start_reconnect();
//!             }
//!         }
//!         Some(frame) = channel.recv() => { /* heartbeat → monitor.record_heartbeat */ }
//!     }
//! }
//! ```
//!
//! Time always comes from `tokio::time`, so tests run under a paused
//! clock (`#[tokio::test(start_paused = true)]`).

mod backoff;
mod link;
mod monitor;

pub use backoff::{Backoff, BackoffConfig};
pub use link::LinkState;
pub use monitor::{HeartbeatConfig, Liveness, LivenessMonitor};
