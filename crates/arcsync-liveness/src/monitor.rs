//! Heartbeat-based liveness detection.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{trace, warn};

/// Heartbeat settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// How often this client sends a heartbeat and checks liveness.
    /// Default: 30 s.
    pub interval: Duration,
    /// Silence from every other actor longer than this marks the link
    /// suspect. Default: 60 s.
    pub liveness_threshold: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            liveness_threshold: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Fix out-of-range values so the config is safe to use.
    ///
    /// - `interval` at least 1 ms (a zero interval would spin).
    /// - `liveness_threshold` at least one `interval`.
    pub fn validated(mut self) -> Self {
        if self.interval.is_zero() {
            warn!("heartbeat interval is zero; using 1ms");
            self.interval = Duration::from_millis(1);
        }
        if self.liveness_threshold < self.interval {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                threshold_ms = self.liveness_threshold.as_millis() as u64,
                "liveness threshold shorter than heartbeat interval; raising it"
            );
            self.liveness_threshold = self.interval;
        }
        self
    }
}

/// Result of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// A heartbeat arrived within the threshold.
    Alive,
    /// Nothing heard for `silent_for`, which exceeds the threshold.
    Suspect { silent_for: Duration },
}

/// Tracks when another actor was last heard from.
///
/// Time is passed in rather than read, so the monitor can be driven by a
/// real clock, tokio's paused test clock, or plain arithmetic.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    config: HeartbeatConfig,
    last_heartbeat: Instant,
    missed_heartbeats: u32,
}

impl LivenessMonitor {
    /// Starts monitoring as if a heartbeat had just arrived at `now`.
    pub fn new(config: HeartbeatConfig, now: Instant) -> Self {
        Self {
            config: config.validated(),
            last_heartbeat: now,
            missed_heartbeats: 0,
        }
    }

    /// A heartbeat from another actor arrived.
    pub fn record_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat = now;
        self.missed_heartbeats = 0;
        trace!("heartbeat recorded");
    }

    /// Restarts monitoring from `now`, e.g. after a reconnect.
    pub fn reset(&mut self, now: Instant) {
        self.record_heartbeat(now);
    }

    /// Checks the link at `now` and updates the missed-heartbeat count.
    ///
    /// Suspect only when the silence is strictly longer than the
    /// threshold: exactly 60 s of silence is still alive.
    pub fn check(&mut self, now: Instant) -> Liveness {
        let silent_for = now.saturating_duration_since(self.last_heartbeat);
        self.missed_heartbeats =
            (silent_for.as_millis() / self.config.interval.as_millis().max(1)) as u32;

        if silent_for > self.config.liveness_threshold {
            Liveness::Suspect { silent_for }
        } else {
            Liveness::Alive
        }
    }

    /// Whole heartbeat intervals elapsed without a heartbeat, as of the
    /// last [`check`](Self::check).
    pub fn missed_heartbeats(&self) -> u32 {
        self.missed_heartbeats
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }
}
