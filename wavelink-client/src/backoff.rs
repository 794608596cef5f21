//! Reconnect backoff
//!
//! Full-jitter exponential backoff: the delay for attempt `n` is drawn
//! uniformly from `[0, min(min_delay * 2^min(n, 16), max_delay))`. The
//! exponent clamp keeps the shift within range for arbitrarily long
//! outages; the uniform draw spreads reconnecting clients over the whole
//! window instead of synchronizing them.

use rand::Rng;
use std::time::Duration;

const MAX_EXPONENT: u32 = 16;

/// Computes randomized reconnect delays from the configured bounds.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    min_delay: Duration,
    max_delay: Duration,
}

impl ReconnectBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
        }
    }

    /// Upper bound of the delay window for the given attempt number.
    pub fn cap(&self, attempts: u32) -> Duration {
        let base = self.min_delay.as_millis() as u64;
        let shifted = base.saturating_mul(1u64 << attempts.min(MAX_EXPONENT));
        Duration::from_millis(shifted.min(self.max_delay.as_millis() as u64))
    }

    /// Draw the delay for the given attempt number.
    pub fn delay(&self, attempts: u32) -> Duration {
        let cap = self.cap(attempts).as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..cap.max(1)))
    }
}
