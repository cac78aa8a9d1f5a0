//! A source driven by an upstream vsync provider.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};
use tracing::{debug, instrument, trace};

use beginframe_args::{BeginFrameArgs, SourceCommand, SourceKind, SourceStateSnapshot};

use super::{BeginFrameSource, SourceContext};
use crate::clock::TickClock;
use crate::config::FeatureFlags;
use crate::error::ChannelError;
use crate::metrics::{MetricsCollector, EXTERNAL_BEGIN_FRAME_LATENCY};
use crate::observer::{
    check_begin_frame_continuity, filter_and_issue_begin_frame, BeginFrameObserver, ObserverKey,
    ObserverSet,
};
use crate::throttle::GpuBusyThrottle;
use crate::ChannelResult;

/// The upstream side of an external source.
pub trait ExternalBeginFrameSourceClient {
    /// Start (`true`) or stop (`false`) producing BeginFrames.
    fn on_needs_begin_frames(&self, needs_begin_frames: bool);
}

struct ExternalState {
    observers: ObserverSet,
    paused: bool,
    last_begin_frame_args: Option<BeginFrameArgs>,
    /// Frame held back while the GPU was busy.
    pending_begin_frame_args: Option<BeginFrameArgs>,
}

/// Fans out frames produced upstream, one `on_begin_frame()` per platform
/// tick.
///
/// Observers must be removed before the source is dropped.
pub struct ExternalBeginFrameSource {
    source_id: u64,
    clock: Rc<dyn TickClock>,
    metrics: Arc<MetricsCollector>,
    features: FeatureFlags,
    latency_sample_period: u32,
    client: Box<dyn ExternalBeginFrameSourceClient>,
    throttle: RefCell<GpuBusyThrottle>,
    state: RefCell<ExternalState>,
}

impl ExternalBeginFrameSource {
    pub fn new(
        context: SourceContext,
        client: Box<dyn ExternalBeginFrameSourceClient>,
        latency_sample_period: u32,
    ) -> Self {
        Self {
            source_id: context.source_id,
            throttle: RefCell::new(context.throttle()),
            clock: context.clock,
            metrics: context.metrics,
            features: context.features,
            latency_sample_period,
            client,
            state: RefCell::new(ExternalState {
                observers: ObserverSet::new(),
                paused: false,
                last_begin_frame_args: None,
                pending_begin_frame_args: None,
            }),
        }
    }

    /// Upstream paused or resumed frame production.
    pub fn on_set_begin_frame_source_paused(&self, paused: bool) {
        let observers = {
            let mut state = self.state.borrow_mut();
            if state.paused == paused {
                return;
            }
            state.paused = paused;
            state.observers.snapshot()
        };
        debug!(source_id = self.source_id, paused, "Pause state changed");
        for observer in &observers {
            observer.on_begin_frame_source_paused_changed(paused);
        }
    }

    /// A frame produced upstream.
    ///
    /// Frames not newer than the last one are dropped: a recreated pipeline
    /// may redeliver.
    pub fn on_begin_frame(&self, args: &BeginFrameArgs) {
        if let Some(last) = self.state.borrow().last_begin_frame_args {
            let same_source_not_newer = args.source_id() == last.source_id()
                && args.sequence_number() <= last.sequence_number();
            if args.frame_time <= last.frame_time || same_source_not_newer {
                trace!(
                    source_id = self.source_id,
                    sequence_number = args.sequence_number(),
                    "Dropping stale BeginFrame"
                );
                return;
            }
        }

        if self.throttle.borrow_mut().request_callback_on_gpu_available() {
            trace!(source_id = self.source_id, "BeginFrame held back until GPU is available");
            self.state.borrow_mut().pending_begin_frame_args = Some(*args);
            return;
        }

        if self.metrics.should_sample(self.latency_sample_period) {
            let latency = self.clock.now().saturating_duration_since(args.frame_time);
            self.metrics.record_duration(EXTERNAL_BEGIN_FRAME_LATENCY, latency);
        }

        let (observers, lost_last_observer) = {
            let mut state = self.state.borrow_mut();
            state.last_begin_frame_args = Some(*args);
            let pruned = state.observers.prune();
            let observers = state.observers.snapshot();
            (observers, pruned && state.observers.is_empty())
        };
        if lost_last_observer {
            self.client.on_needs_begin_frames(false);
            return;
        }

        // Non-root observers first, so the root compositor sees what they
        // produced for this frame.
        let non_root = observers.iter().filter(|observer| !observer.is_root());
        let root = observers.iter().filter(|observer| observer.is_root());
        for observer in non_root.chain(root) {
            if check_begin_frame_continuity(observer.as_ref(), args) {
                filter_and_issue_begin_frame(observer.as_ref(), args);
            }
        }
    }

    /// The last frame retyped as MISSED, if `observer` has not seen it.
    pub fn missed_begin_frame_args(&self, observer: &dyn BeginFrameObserver) -> Option<BeginFrameArgs> {
        let last = self.state.borrow().last_begin_frame_args?;
        if !check_begin_frame_continuity(observer, &last) {
            return None;
        }
        Some(last.as_missed())
    }

    pub fn is_paused(&self) -> bool {
        self.state.borrow().paused
    }

    pub fn last_begin_frame_args(&self) -> Option<BeginFrameArgs> {
        self.state.borrow().last_begin_frame_args
    }

    /// Apply one command from the upstream provider.
    pub fn handle_command(&self, command: SourceCommand) {
        match command {
            SourceCommand::BeginFrame(args) => self.on_begin_frame(&args),
            SourceCommand::SetPaused(paused) => self.on_set_begin_frame_source_paused(paused),
        }
    }

    /// Apply every command already queued. Returns how many were applied.
    #[instrument(name = "external_drain_commands", skip_all, fields(source_id = self.source_id))]
    pub fn drain_commands(&self, commands: &Receiver<SourceCommand>) -> ChannelResult<usize> {
        let mut applied = 0;
        loop {
            match commands.try_recv() {
                Ok(command) => {
                    self.handle_command(command);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => return Ok(applied),
                Err(TryRecvError::Disconnected) => {
                    debug!(applied, "Command channel disconnected");
                    return Err(ChannelError::Disconnected);
                }
            }
        }
    }

    fn on_gpu_no_longer_busy(&self) {
        let pending = self.state.borrow_mut().pending_begin_frame_args.take();
        if let Some(args) = pending {
            self.on_begin_frame(&args);
        }
    }
}

impl BeginFrameSource for ExternalBeginFrameSource {
    fn source_id(&self) -> u64 {
        self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::External
    }

    fn add_observer(&self, observer: Rc<dyn BeginFrameObserver>) {
        let (was_empty, paused) = {
            let mut state = self.state.borrow_mut();
            // Upstream is still running for observers dropped since the
            // last dispatch.
            let pruned = state.observers.prune();
            let was_empty = !pruned && state.observers.is_empty();
            let inserted = state.observers.insert(&observer);
            debug_assert!(inserted, "observer added twice");
            debug!(
                source_id = self.source_id,
                observers = state.observers.len(),
                "Observer added"
            );
            (was_empty, state.paused)
        };
        observer.on_begin_frame_source_paused_changed(paused);
        if was_empty {
            self.client.on_needs_begin_frames(true);
        }

        if self.features.skip_missed_frame_on_add_observer {
            return;
        }
        if let Some(missed_args) = self.missed_begin_frame_args(observer.as_ref()) {
            filter_and_issue_begin_frame(observer.as_ref(), &missed_args);
        }
    }

    fn remove_observer(&self, observer: &dyn BeginFrameObserver) {
        let now_empty = {
            let mut state = self.state.borrow_mut();
            if !state.observers.remove(ObserverKey::of(observer)) {
                return;
            }
            debug!(
                source_id = self.source_id,
                observers = state.observers.len(),
                "Observer removed"
            );
            state.observers.is_empty()
        };
        if now_empty {
            self.client.on_needs_begin_frames(false);
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

    fn state_snapshot(&self) -> SourceStateSnapshot {
        let now = self.clock.now();
        let state = self.state.borrow();
        let throttle = self.throttle.borrow();
        SourceStateSnapshot {
            source_id: self.source_id,
            kind: SourceKind::External,
            paused: state.paused,
            observer_count: state.observers.len(),
            is_gpu_busy: throttle.is_gpu_busy(),
            throttle_state: throttle.state(),
            last_args: state.last_begin_frame_args.map(|args| args.snapshot(now)),
        }
    }
}

impl Drop for ExternalBeginFrameSource {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.state.get_mut().observers.is_empty(),
                "observers must be removed before the source is dropped"
            );
        }
    }
}
