//! Monotonic time source for event timestamps.
//!
//! Every event carries a microsecond timestamp taken from a [`Clock`]. The
//! production implementation wraps `std::time::Instant`; tests substitute a
//! manually-advanced clock so timestamp-dependent behavior is deterministic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic microsecond timestamps.
pub trait Clock: Send + Sync {
    /// Microseconds elapsed since the clock's origin.
    fn now_micros(&self) -> u64;
}

/// Wall-independent clock backed by `Instant`, with the origin fixed at
/// construction. Timestamps from one instance are mutually comparable;
/// timestamps from different instances are not.
#[derive(Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Creates a clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Manually-stepped clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at the given microsecond value.
    pub fn starting_at(micros: u64) -> Self {
        Self {
            micros: AtomicU64::new(micros),
        }
    }

    /// Advances the clock by the given number of microseconds.
    pub fn advance(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.micros.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_does_not_go_backwards() {
        let clock = MonotonicClock::new();
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(b >= a);
    }

    #[test]
    fn manual_clock_advances_by_request() {
        let clock = ManualClock::starting_at(1_000);
        assert_eq!(clock.now_micros(), 1_000);
        clock.advance(250);
        assert_eq!(clock.now_micros(), 1_250);
    }
}
