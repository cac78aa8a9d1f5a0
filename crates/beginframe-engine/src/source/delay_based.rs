//! A source ticking on a vsync-aligned timer.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, trace};

use beginframe_args::{BeginFrameArgs, BeginFrameArgsGenerator, SourceKind, SourceStateSnapshot};

use super::{BeginFrameSource, SourceContext};
use crate::clock::TickClock;
use crate::config::FeatureFlags;
use crate::metrics::{MetricsCollector, VRR_FRAME_COUNT};
use crate::observer::{filter_and_issue_begin_frame, BeginFrameObserver, ObserverKey, ObserverSet};
use crate::throttle::GpuBusyThrottle;
use crate::time_source::TimeSource;

/// Frames closer together than `interval / DOUBLE_TICK_DIVISOR` count as
/// the same tick.
const DOUBLE_TICK_DIVISOR: u32 = 2;

struct DelayBasedState {
    observers: ObserverSet,
    generator: BeginFrameArgsGenerator,
    last_begin_frame_args: Option<BeginFrameArgs>,
    last_vsync_interval: Duration,
    max_vrr_interval: Option<Duration>,
    vrr_tick_count: u64,
}

/// Ticks every vsync interval while it has observers.
pub struct DelayBasedBeginFrameSource {
    source_id: u64,
    clock: Rc<dyn TickClock>,
    metrics: Arc<MetricsCollector>,
    features: FeatureFlags,
    throttle: RefCell<GpuBusyThrottle>,
    time_source: RefCell<Box<dyn TimeSource>>,
    state: RefCell<DelayBasedState>,
}

impl DelayBasedBeginFrameSource {
    pub fn new(context: SourceContext, time_source: Box<dyn TimeSource>) -> Self {
        let last_vsync_interval = time_source.interval();
        Self {
            source_id: context.source_id,
            throttle: RefCell::new(context.throttle()),
            clock: context.clock,
            metrics: context.metrics,
            features: context.features,
            time_source: RefCell::new(time_source),
            state: RefCell::new(DelayBasedState {
                observers: ObserverSet::new(),
                generator: BeginFrameArgsGenerator::new(),
                last_begin_frame_args: None,
                last_vsync_interval,
                max_vrr_interval: None,
                vrr_tick_count: 0,
            }),
        }
    }

    /// Fire the timer if it is due. Returns true if it fired.
    pub fn poll_timer(&self) -> bool {
        let fired = self.time_source.borrow_mut().poll();
        if fired {
            self.on_timer_tick();
        }
        fired
    }

    /// When the timer fires next, if it is running.
    pub fn next_tick_time(&self) -> Option<Instant> {
        self.time_source.borrow().next_tick_time()
    }

    pub fn last_begin_frame_args(&self) -> Option<BeginFrameArgs> {
        self.state.borrow().last_begin_frame_args
    }

    /// Produce a frame for the tick that just came due and hand it to every
    /// observer.
    pub fn on_timer_tick(&self) {
        if self.throttle.borrow_mut().request_callback_on_gpu_available() {
            trace!(source_id = self.source_id, "Tick held back until GPU is available");
            return;
        }

        let (frame_time, timer_interval) = {
            let time_source = self.time_source.borrow();
            let interval = time_source.interval();
            // Under back-pressure the last tick time falls behind; after an
            // interval change next - interval can precede it. Take the later.
            let from_next = time_source
                .next_tick_time()
                .and_then(|next| next.checked_sub(interval));
            let frame_time = match (time_source.last_tick_time(), from_next) {
                (Some(last), Some(from_next)) => last.max(from_next),
                (Some(last), None) => last,
                (None, Some(from_next)) => from_next,
                (None, None) => return,
            };
            (frame_time, interval)
        };

        let (args, observers) = {
            let mut state = self.state.borrow_mut();
            let args = create_begin_frame_args(&mut state, self.source_id, frame_time, timer_interval);
            state.last_begin_frame_args = Some(args);
            if state.max_vrr_interval.is_some() {
                state.vrr_tick_count += 1;
            }
            (args, state.observers.snapshot())
        };

        if observers.is_empty() {
            self.time_source.borrow_mut().set_active(false);
            return;
        }
        for observer in &observers {
            self.issue_begin_frame_to_observer(observer.as_ref(), &args);
        }
    }

    fn on_gpu_no_longer_busy(&self) {
        self.on_timer_tick();
    }

    /// Deliver unless the observer already has a frame from this tick.
    fn issue_begin_frame_to_observer(&self, observer: &dyn BeginFrameObserver, args: &BeginFrameArgs) {
        let margin = {
            let state = self.state.borrow();
            self.double_tick_margin(&state, args.interval)
        };
        let deliver = match observer.last_used_begin_frame_args() {
            None => true,
            Some(last) => args.frame_time > last.frame_time + margin,
        };
        if deliver {
            filter_and_issue_begin_frame(observer, args);
        }
    }

    fn double_tick_margin(&self, state: &DelayBasedState, args_interval: Duration) -> Duration {
        if state.max_vrr_interval.is_some() {
            return Duration::ZERO;
        }
        let interval = if self.features.use_last_vsync_interval_for_double_tick {
            state.last_vsync_interval
        } else {
            args_interval
        };
        interval / DOUBLE_TICK_DIVISOR
    }

    fn flush_vrr_tick_count(&self, state: &mut DelayBasedState) {
        debug!(
            source_id = self.source_id,
            frames = state.vrr_tick_count,
            "Flushing VRR frame count"
        );
        self.metrics.record(VRR_FRAME_COUNT, state.vrr_tick_count);
        state.vrr_tick_count = 0;
    }
}

/// Generate args for a tick at `frame_time`, honoring the VRR override.
fn create_begin_frame_args(
    state: &mut DelayBasedState,
    source_id: u64,
    frame_time: Instant,
    timer_interval: Duration,
) -> BeginFrameArgs {
    let interval = state.max_vrr_interval.unwrap_or(timer_interval);
    state
        .generator
        .generate(source_id, frame_time, frame_time + interval, interval)
}

impl BeginFrameSource for DelayBasedBeginFrameSource {
    fn source_id(&self) -> u64 {
        self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::DelayBased
    }

    #[instrument(name = "delay_based_add_observer", skip_all, fields(source_id = self.source_id))]
    fn add_observer(&self, observer: Rc<dyn BeginFrameObserver>) {
        {
            let mut state = self.state.borrow_mut();
            let inserted = state.observers.insert(&observer);
            debug_assert!(inserted, "observer added twice");
            debug!(observers = state.observers.len(), "Observer added");
        }
        observer.on_begin_frame_source_paused_changed(false);
        self.time_source.borrow_mut().set_active(true);

        let (last_or_missed_tick_time, timer_interval) = {
            let time_source = self.time_source.borrow();
            let interval = time_source.interval();
            let last_or_missed = time_source
                .next_tick_time()
                .and_then(|next| next.checked_sub(interval));
            match last_or_missed {
                Some(tick_time) => (tick_time, interval),
                None => return,
            }
        };

        // Reuse the last args (and their sequence number) if they still
        // describe the most recent tick. After the timer was idle, make new
        // ones, but only if enough time passed to not double-tick.
        let missed_args = {
            let mut state = self.state.borrow_mut();
            let stale = match state.last_begin_frame_args {
                None => true,
                Some(last) => {
                    let margin = self.double_tick_margin(&state, last.interval);
                    last_or_missed_tick_time > last.frame_time + margin
                }
            };
            if stale {
                let args = create_begin_frame_args(
                    &mut state,
                    self.source_id,
                    last_or_missed_tick_time,
                    timer_interval,
                );
                state.last_begin_frame_args = Some(args);
            }
            state.last_begin_frame_args.map(|args| args.as_missed())
        };

        if self.features.skip_missed_frame_on_add_observer {
            return;
        }
        if let Some(missed_args) = missed_args {
            self.issue_begin_frame_to_observer(observer.as_ref(), &missed_args);
        }
    }

    fn remove_observer(&self, observer: &dyn BeginFrameObserver) {
        let now_empty = {
            let mut state = self.state.borrow_mut();
            state.observers.remove(ObserverKey::of(observer));
            debug!(
                source_id = self.source_id,
                observers = state.observers.len(),
                "Observer removed"
            );
            state.observers.is_empty()
        };
        if now_empty {
            self.time_source.borrow_mut().set_active(false);
        }
    }

    fn is_throttled(&self) -> bool {
        true
    }

    fn set_is_gpu_busy(&self, busy: bool) {
        let released = self.throttle.borrow_mut().set_is_gpu_busy(busy);
        if released {
            self.on_gpu_no_longer_busy();
        }
    }

    fn on_update_vsync_parameters(&self, timebase: Instant, interval: Duration) {
        self.state.borrow_mut().last_vsync_interval = interval;
        self.time_source
            .borrow_mut()
            .set_timebase_and_interval(Some(timebase), interval);
    }

    fn set_max_vrr_interval(&self, max_vrr_interval: Option<Duration>) {
        let mut state = self.state.borrow_mut();
        if state.max_vrr_interval.is_some() && max_vrr_interval.is_none() {
            self.flush_vrr_tick_count(&mut state);
        }
        state.max_vrr_interval = max_vrr_interval;
    }

    fn state_snapshot(&self) -> SourceStateSnapshot {
        let now = self.clock.now();
        let state = self.state.borrow();
        let throttle = self.throttle.borrow();
        SourceStateSnapshot {
            source_id: self.source_id,
            kind: SourceKind::DelayBased,
            paused: false,
            observer_count: state.observers.len(),
            is_gpu_busy: throttle.is_gpu_busy(),
            throttle_state: throttle.state(),
            last_args: state.last_begin_frame_args.map(|args| args.snapshot(now)),
        }
    }
}

impl Drop for DelayBasedBeginFrameSource {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.max_vrr_interval.is_some() {
            let frames = state.vrr_tick_count;
            state.vrr_tick_count = 0;
            self.metrics.record(VRR_FRAME_COUNT, frames);
        }
    }
}
