//! Monotonic clocks.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of "now" for timers and throttling.
pub trait TickClock {
    fn now(&self) -> Instant;
}

/// Wall-clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTickClock;

impl TickClock for SystemTickClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualTickClock {
    now: Cell<Instant>,
}

impl ManualTickClock {
    /// Create a clock frozen at the current instant.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a clock frozen at `now`.
    pub fn starting_at(now: Instant) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }

    /// Jump to `now`. Must not go backwards.
    pub fn set_now(&self, now: Instant) {
        debug_assert!(now >= self.now.get(), "monotonic clock moved backwards");
        self.now.set(now);
    }
}

impl Default for ManualTickClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickClock for ManualTickClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}
