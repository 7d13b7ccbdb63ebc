//! Rate-limit gate.
//!
//! Holds the epoch-millisecond instant until which requests to the source must
//! not be attempted. The fetcher consults [`RateLimitGate::should_suppress`]
//! before every request and feeds throttle hints back through
//! [`RateLimitGate::record_throttled`].
//!
//! State is in-memory only and starts open (`reset_at = 0`); after a restart
//! the source simply re-signals on the first attempt.
//!
//! Every method has an `_at` twin taking an explicit `now_ms` so tests can
//! drive simulated time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, warn};

/// Cooldown applied when the source throttles without saying for how long.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Remaining-quota level at which a warning is logged.
const LOW_QUOTA: u64 = 10;

#[derive(Debug)]
pub struct RateLimitGate {
    reset_at_ms: AtomicI64,
    /// Last remaining-quota value seen, `-1` if never observed.
    remaining: AtomicI64,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl RateLimitGate {
    pub fn new() -> Self {
        Self {
            reset_at_ms: AtomicI64::new(0),
            remaining: AtomicI64::new(-1),
        }
    }

    /// `true` while the cooldown has not elapsed yet.
    pub fn should_suppress(&self) -> bool {
        self.should_suppress_at(now_ms())
    }

    pub fn should_suppress_at(&self, now_ms: i64) -> bool {
        now_ms < self.reset_at_ms.load(Ordering::Acquire)
    }

    /// Close the gate until `reset_at_ms`, or for [`DEFAULT_COOLDOWN`] when the
    /// source gave no hint.
    pub fn record_throttled(&self, reset_at_ms: Option<i64>) {
        self.record_throttled_at(reset_at_ms, now_ms());
    }

    pub fn record_throttled_at(&self, reset_at_ms: Option<i64>, now_ms: i64) {
        let reset = reset_at_ms.unwrap_or(now_ms + DEFAULT_COOLDOWN.as_millis() as i64);
        self.reset_at_ms.store(reset, Ordering::Release);
        debug!(
            target: "hubcast::sources",
            reset_at_ms = reset,
            wait_ms = reset.saturating_sub(now_ms),
            "Rate-limit gate closed"
        );
    }

    /// Epoch milliseconds at which the gate reopens (0 when never closed).
    pub fn reset_at_ms(&self) -> i64 {
        self.reset_at_ms.load(Ordering::Acquire)
    }

    /// Record the remaining-quota value reported by the source.
    pub fn observe_remaining(&self, remaining: u64) {
        self.remaining
            .store(i64::try_from(remaining).unwrap_or(i64::MAX), Ordering::Relaxed);
        if remaining <= LOW_QUOTA {
            warn!(target: "hubcast::sources", remaining, "Source request quota is running low");
        }
    }

    /// Last remaining-quota value seen, if any.
    pub fn remaining(&self) -> Option<u64> {
        u64::try_from(self.remaining.load(Ordering::Relaxed)).ok()
    }
}

impl Default for RateLimitGate {
    fn default() -> Self {
        Self::new()
    }
}
