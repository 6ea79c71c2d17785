//! Clock abstraction and cooperative deadlines
//!
//! Calibration and measurement poll a wall-clock deadline every
//! simulated tick instead of being preempted. The clock is injected so
//! tests can drive time by hand.

use std::cell::Cell;
use std::time::Instant;

/// Source of monotonic wall-clock time in milliseconds.
pub trait Clock {
    /// Milliseconds elapsed since some fixed origin.
    fn now_ms(&self) -> u64;
}

/// Real clock backed by `std::time::Instant`.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock with its origin at construction time.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    /// Create a manual clock starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// An absolute point in clock time after which work must abort.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at_ms: Option<u64>,
}

impl Deadline {
    /// A deadline `timeout_ms` from the clock's current time.
    pub fn after(clock: &dyn Clock, timeout_ms: u64) -> Self {
        Self {
            at_ms: Some(clock.now_ms().saturating_add(timeout_ms)),
        }
    }

    /// A deadline that never expires.
    pub fn none() -> Self {
        Self { at_ms: None }
    }

    /// True once the clock has passed the deadline.
    pub fn expired(&self, clock: &dyn Clock) -> bool {
        match self.at_ms {
            Some(at) => clock.now_ms() >= at,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new();
        assert_eq!(clock.now_ms(), 0);
        clock.advance(250);
        assert_eq!(clock.now_ms(), 250);
    }

    #[test]
    fn deadline_expiry() {
        let clock = ManualClock::new();
        let deadline = Deadline::after(&clock, 100);
        assert!(!deadline.expired(&clock));
        clock.advance(100);
        assert!(deadline.expired(&clock));
    }

    #[test]
    fn deadline_none_never_expires() {
        let clock = ManualClock::new();
        let deadline = Deadline::none();
        clock.advance(u64::MAX / 2);
        assert!(!deadline.expired(&clock));
    }

    #[test]
    fn zero_timeout_expires_immediately() {
        let clock = ManualClock::new();
        let deadline = Deadline::after(&clock, 0);
        assert!(deadline.expired(&clock));
    }
}
