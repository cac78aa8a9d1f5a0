//! Cooperative timers that drive synthetic sources.
//!
//! A timer never fires on its own: whoever owns the event loop calls
//! `poll()`, and the timer reports whether its next tick came due. This
//! replaces a posted-task timer with a client back-pointer.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::clock::TickClock;

/// Timer abstraction used by synthetic sources.
pub trait TimeSource {
    /// Start or stop ticking. Activation schedules the first tick.
    fn set_active(&mut self, active: bool);

    fn active(&self) -> bool;

    /// When the most recent tick was due.
    fn last_tick_time(&self) -> Option<Instant>;

    /// When the next tick is due, or `None` while inactive.
    fn next_tick_time(&self) -> Option<Instant>;

    fn interval(&self) -> Duration;

    /// Align ticks to `timebase + k * interval`. Without a timebase the grid
    /// is pinned to the first time a tick is scheduled. A zero interval
    /// ticks immediately.
    fn set_timebase_and_interval(&mut self, timebase: Option<Instant>, interval: Duration);

    /// Returns true if a tick came due since the last poll. Late polls
    /// coalesce: at most one tick fires per call.
    fn poll(&mut self) -> bool;
}

/// Timer ticking on a vsync-aligned grid.
pub struct DelayBasedTimeSource {
    clock: Rc<dyn TickClock>,
    active: bool,
    timebase: Option<Instant>,
    interval: Duration,
    last_tick_time: Option<Instant>,
    next_tick_time: Option<Instant>,
}

impl DelayBasedTimeSource {
    /// Create an inactive timer with a zero interval.
    pub fn new(clock: Rc<dyn TickClock>) -> Self {
        Self {
            clock,
            active: false,
            timebase: None,
            interval: Duration::ZERO,
            last_tick_time: None,
            next_tick_time: None,
        }
    }

    /// Create an inactive timer on the given grid.
    pub fn with_interval(
        clock: Rc<dyn TickClock>,
        timebase: Option<Instant>,
        interval: Duration,
    ) -> Self {
        let mut time_source = Self::new(clock);
        time_source.set_timebase_and_interval(timebase, interval);
        time_source
    }

    fn schedule_next_tick(&mut self, now: Instant) {
        if self.interval.is_zero() {
            self.next_tick_time = Some(now);
            return;
        }

        let timebase = *self.timebase.get_or_insert(now);
        let mut next = snapped_to_next_tick(now, timebase, self.interval);
        if next == now {
            next += self.interval;
        }
        debug_assert!(next > now);
        self.next_tick_time = Some(next);
    }
}

impl TimeSource for DelayBasedTimeSource {
    fn set_active(&mut self, active: bool) {
        if self.active == active {
            return;
        }
        self.active = active;

        if !active {
            self.next_tick_time = None;
            return;
        }
        let now = self.clock.now();
        self.schedule_next_tick(now);
    }

    fn active(&self) -> bool {
        self.active
    }

    fn last_tick_time(&self) -> Option<Instant> {
        self.last_tick_time
    }

    fn next_tick_time(&self) -> Option<Instant> {
        if self.active {
            self.next_tick_time
        } else {
            None
        }
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn set_timebase_and_interval(&mut self, timebase: Option<Instant>, interval: Duration) {
        self.timebase = timebase;
        self.interval = interval;

        if self.active {
            let now = self.clock.now();
            self.schedule_next_tick(now);
        }
    }

    fn poll(&mut self) -> bool {
        if !self.active {
            return false;
        }
        let Some(next_tick_time) = self.next_tick_time else {
            return false;
        };
        let now = self.clock.now();
        if now < next_tick_time {
            return false;
        }

        self.last_tick_time = Some(next_tick_time);
        self.schedule_next_tick(now);
        true
    }
}

/// First grid point `timebase + k * interval` at or after `now`.
fn snapped_to_next_tick(now: Instant, timebase: Instant, interval: Duration) -> Instant {
    let interval_ns = interval.as_nanos();

    if now >= timebase {
        let elapsed_ns = (now - timebase).as_nanos();
        let ticks = elapsed_ns.div_ceil(interval_ns);
        timebase + Duration::from_nanos((ticks * interval_ns) as u64)
    } else {
        let ahead_ns = (timebase - now).as_nanos();
        let ticks = ahead_ns / interval_ns;
        timebase - Duration::from_nanos((ticks * interval_ns) as u64)
    }
}
