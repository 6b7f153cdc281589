//! Reconnect backoff.
//!
//! # Backoff Formula
//!
//! delay(n) = min(base * 1.5^(n - 1), 30s) for the n-th consecutive attempt
//!
//! With the default 3s base:
//! - Attempt 1: 3s
//! - Attempt 2: 4.5s
//! - Attempt 3: 6.75s
//! - ...
//! - Attempt 7+: 30s (capped)
//!
//! The counter resets only when a transport reports open, so a connection
//! that flaps right after opening still backs off.

use std::time::Duration;

use crate::constants::{BACKOFF_FACTOR, MAX_RECONNECT_DELAY};

/// Delay before the `attempt`-th consecutive reconnect (1-based).
#[must_use]
pub fn reconnect_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(64) as i32;
    let delay_ms = base.as_millis() as f64 * BACKOFF_FACTOR.powi(exponent);
    let capped = delay_ms.min(MAX_RECONNECT_DELAY.as_millis() as f64);
    Duration::from_millis(capped as u64)
}

/// Tracks consecutive reconnect attempts.
#[derive(Debug, Default)]
pub struct Backoff {
    attempts: u32,
}

impl Backoff {
    /// Count another attempt and return the delay to wait before it.
    ///
    /// `base` is passed per call so configuration changes apply to the
    /// next attempt.
    pub fn next_delay(&mut self, base: Duration) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        reconnect_delay(base, self.attempts)
    }

    /// Forget previous failures (transport opened).
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive attempts since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
