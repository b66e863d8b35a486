//! Reconnect backoff
//!
//! Bounded multiplicative backoff: deterministic by design (no jitter), so
//! the reconnect schedule is simple to reason about and to test.

use std::time::Duration;

pub struct Backoff {
    base: Duration,
    factor: f64,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, factor: f64, max: Duration) -> Self {
        let factor = factor.max(1.0);
        let max = max.max(base);
        Self {
            base,
            factor,
            max,
            current: base,
        }
    }

    /// The delay to sleep before the next attempt; escalates for the one
    /// after.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.mul_f64(self.factor).min(self.max);
        delay
    }

    /// Reset after a successful registration.
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}
