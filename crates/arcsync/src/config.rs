//! Client configuration.

use std::time::Duration;

use arcsync_liveness::{BackoffConfig, HeartbeatConfig};
use arcsync_queue::QueueConfig;
use arcsync_state::DEFAULT_ROLLBACK_CAPACITY;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Everything a [`SyncService`](crate::SyncService) can be tuned with.
///
/// The defaults suit a turn-based card game on a phone network:
///
/// | Setting | Default |
/// |---|---|
/// | `backoff` | 1 s doubling to 30 s, 10 attempts |
/// | `heartbeat` | every 30 s, suspect after 60 s of silence |
/// | `queue` | 3 retries, 1000 entries |
/// | `validation_timeout` | 5 s |
/// | `state_sync_timeout` | 5 s |
/// | `rollback_capacity` | 256 |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub backoff: BackoffConfig,
    pub heartbeat: HeartbeatConfig,
    pub queue: QueueConfig,
    /// When `false`, every action is broadcast without asking the
    /// validator first.
    pub validation_enabled: bool,
    /// Bound on one validation request. Past it the outcome is unknown
    /// and the action is queued.
    pub validation_timeout: Duration,
    /// How long `request_state_sync` waits for the authority's answer.
    pub state_sync_timeout: Duration,
    /// Most optimistic updates awaiting confirmation at once. The oldest
    /// entry is evicted past this.
    pub rollback_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            queue: QueueConfig::default(),
            validation_enabled: true,
            validation_timeout: Duration::from_secs(5),
            state_sync_timeout: Duration::from_secs(5),
            rollback_capacity: DEFAULT_ROLLBACK_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Fix out-of-range values so the config is safe to use.
    ///
    /// Nested configs are validated by their own rules. Zero timeouts
    /// fall back to the defaults and `rollback_capacity` is at least 1.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        self.backoff = self.backoff.validated();
        self.heartbeat = self.heartbeat.validated();
        self.queue = self.queue.validated();

        if self.validation_timeout.is_zero() {
            warn!("validation_timeout is zero; using default");
            self.validation_timeout = defaults.validation_timeout;
        }
        if self.state_sync_timeout.is_zero() {
            warn!("state_sync_timeout is zero; using default");
            self.state_sync_timeout = defaults.state_sync_timeout;
        }
        if self.rollback_capacity == 0 {
            warn!("rollback_capacity is zero; using 1");
            self.rollback_capacity = 1;
        }
        self
    }
}
