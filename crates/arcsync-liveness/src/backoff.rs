//! Exponential reconnection backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Reconnection backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry. Default: 1 s.
    pub base_delay: Duration,
    /// Upper bound on any single delay. Default: 30 s.
    pub max_delay: Duration,
    /// Retries before giving up. Default: 10.
    pub max_attempts: u32,
    /// Random extra delay (0..jitter) added to every retry, to spread
    /// clients that lost the same server at the same instant. Default: 0,
    /// which keeps the schedule exact.
    pub jitter: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            max_attempts: 10,
            jitter: Duration::ZERO,
        }
    }
}

impl BackoffConfig {
    /// Fix out-of-range values so the config is safe to use.
    ///
    /// - `base_delay` at least 1 ms.
    /// - `max_delay` at least `base_delay`.
    pub fn validated(mut self) -> Self {
        if self.base_delay.is_zero() {
            warn!("backoff base_delay is zero; using 1ms");
            self.base_delay = Duration::from_millis(1);
        }
        if self.max_delay < self.base_delay {
            warn!(
                base_ms = self.base_delay.as_millis() as u64,
                max_ms = self.max_delay.as_millis() as u64,
                "backoff max_delay below base_delay; raising it"
            );
            self.max_delay = self.base_delay;
        }
        self
    }
}

/// Retry counter and delay calculator.
///
/// Pure state: it never sleeps. The caller asks for the next delay,
/// waits however it likes, and reports the outcome.
///
/// ```text
/// attempt:  0     1     2     3      4      5      ...  9      10
/// delay:    1s    2s    4s    8s     16s    30s    ...  30s    None
/// ```
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config: config.validated(),
            attempt: 0,
        }
    }

    /// Delay to wait before the next retry, or `None` once `max_attempts`
    /// retries have failed.
    ///
    /// `min(base_delay · 2^attempt, max_delay)` plus jitter.
    pub fn next_delay(&self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        let factor = 2u32.checked_pow(self.attempt).unwrap_or(u32::MAX);
        let delay = self
            .config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay);
        Some(delay + self.jitter())
    }

    /// Counts one failed retry.
    pub fn record_failure(&mut self) {
        self.attempt = self.attempt.saturating_add(1);
    }

    /// Back to attempt 0 after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Failed retries so far.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.config.max_attempts
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    fn jitter(&self) -> Duration {
        let max_us = self.config.jitter.as_micros() as u64;
        if max_us == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::rng().random_range(0..max_us))
    }
}
