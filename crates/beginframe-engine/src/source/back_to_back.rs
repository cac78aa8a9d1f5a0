//! A source paced by its observers instead of by vsync.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use beginframe_args::{
    default_interval, ArgsType, BeginFrameArgs, SourceKind, SourceStateSnapshot,
    STARTING_FRAME_NUMBER,
};

use super::{BeginFrameSource, SourceContext};
use crate::clock::TickClock;
use crate::observer::{filter_and_issue_begin_frame, BeginFrameObserver, ObserverKey, ObserverSet};
use crate::throttle::GpuBusyThrottle;
use crate::time_source::TimeSource;

struct BackToBackState {
    observers: ObserverSet,
    /// Observers owed a frame on the next tick.
    pending_begin_frame_observers: ObserverSet,
    next_sequence_number: u64,
    vsync_interval: Duration,
    max_vrr_interval: Option<Duration>,
    last_begin_frame_args: Option<BeginFrameArgs>,
}

/// Ticks as soon as any observer asked for a frame.
///
/// Each observer gets one frame per `did_finish_frame()`; an observer that
/// never finishes stops receiving frames.
pub struct BackToBackBeginFrameSource {
    source_id: u64,
    clock: Rc<dyn TickClock>,
    throttle: RefCell<GpuBusyThrottle>,
    time_source: RefCell<Box<dyn TimeSource>>,
    state: RefCell<BackToBackState>,
}

impl BackToBackBeginFrameSource {
    pub fn new(context: SourceContext, mut time_source: Box<dyn TimeSource>) -> Self {
        // Ticks immediately; the timer is active only while a frame is owed.
        time_source.set_timebase_and_interval(None, Duration::ZERO);
        Self {
            source_id: context.source_id,
            throttle: RefCell::new(context.throttle()),
            clock: context.clock,
            time_source: RefCell::new(time_source),
            state: RefCell::new(BackToBackState {
                observers: ObserverSet::new(),
                pending_begin_frame_observers: ObserverSet::new(),
                next_sequence_number: STARTING_FRAME_NUMBER,
                vsync_interval: default_interval(),
                max_vrr_interval: None,
                last_begin_frame_args: None,
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

    /// Deliver one frame to every pending observer.
    pub fn on_timer_tick(&self) {
        if self.throttle.borrow_mut().request_callback_on_gpu_available() {
            trace!(source_id = self.source_id, "Tick held back until GPU is available");
            return;
        }

        let frame_time = {
            let time_source = self.time_source.borrow();
            if !time_source.active() {
                return;
            }
            match time_source.last_tick_time() {
                Some(frame_time) => frame_time,
                None => return,
            }
        };

        let (args, pending) = {
            let mut state = self.state.borrow_mut();
            let interval = state.max_vrr_interval.unwrap_or(state.vsync_interval);
            let args = BeginFrameArgs::new(
                self.source_id,
                state.next_sequence_number,
                frame_time,
                frame_time + interval,
                interval,
                ArgsType::Normal,
            );
            state.next_sequence_number += 1;
            state.last_begin_frame_args = Some(args);
            state.observers.prune();
            let mut pending = std::mem::take(&mut state.pending_begin_frame_observers);
            (args, pending.snapshot())
        };

        // Reactivated by the next did_finish_frame().
        self.time_source.borrow_mut().set_active(false);

        for observer in &pending {
            filter_and_issue_begin_frame(observer.as_ref(), &args);
        }
    }

    fn on_gpu_no_longer_busy(&self) {
        self.on_timer_tick();
    }
}

impl BeginFrameSource for BackToBackBeginFrameSource {
    fn source_id(&self) -> u64 {
        self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::BackToBack
    }

    fn add_observer(&self, observer: Rc<dyn BeginFrameObserver>) {
        {
            let mut state = self.state.borrow_mut();
            state.observers.prune();
            let inserted = state.observers.insert(&observer);
            debug_assert!(inserted, "observer added twice");
            state.pending_begin_frame_observers.insert(&observer);
            debug!(
                source_id = self.source_id,
                observers = state.observers.len(),
                "Observer added"
            );
        }
        observer.on_begin_frame_source_paused_changed(false);
        self.time_source.borrow_mut().set_active(true);
    }

    fn remove_observer(&self, observer: &dyn BeginFrameObserver) {
        let key = ObserverKey::of(observer);
        let no_pending = {
            let mut state = self.state.borrow_mut();
            state.observers.remove(key);
            state.pending_begin_frame_observers.remove(key);
            debug!(
                source_id = self.source_id,
                observers = state.observers.len(),
                "Observer removed"
            );
            state.pending_begin_frame_observers.is_empty()
        };
        if no_pending {
            self.time_source.borrow_mut().set_active(false);
        }
    }

    fn did_finish_frame(&self, observer: &dyn BeginFrameObserver) {
        let key = ObserverKey::of(observer);
        let registered = {
            let mut state = self.state.borrow_mut();
            let state = &mut *state;
            state
                .pending_begin_frame_observers
                .insert_from(&state.observers, key);
            state.observers.contains(key)
        };
        if registered {
            self.time_source.borrow_mut().set_active(true);
        }
    }

    fn is_throttled(&self) -> bool {
        false
    }

    fn set_is_gpu_busy(&self, busy: bool) {
        let released = self.throttle.borrow_mut().set_is_gpu_busy(busy);
        if released {
            self.on_gpu_no_longer_busy();
        }
    }

    fn on_update_vsync_parameters(&self, _timebase: Instant, interval: Duration) {
        self.state.borrow_mut().vsync_interval = interval;
    }

    fn set_max_vrr_interval(&self, max_vrr_interval: Option<Duration>) {
        self.state.borrow_mut().max_vrr_interval = max_vrr_interval;
    }

    fn state_snapshot(&self) -> SourceStateSnapshot {
        let now = self.clock.now();
        let state = self.state.borrow();
        let throttle = self.throttle.borrow();
        SourceStateSnapshot {
            source_id: self.source_id,
            kind: SourceKind::BackToBack,
            paused: false,
            observer_count: state.observers.len(),
            is_gpu_busy: throttle.is_gpu_busy(),
            throttle_state: throttle.state(),
            last_args: state.last_begin_frame_args.map(|args| args.snapshot(now)),
        }
    }
}
