//! Recording observers for the source tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use beginframe_args::BeginFrameArgs;

use super::SourceContext;
use crate::clock::ManualTickClock;
use crate::config::FeatureFlags;
use crate::metrics::MetricsCollector;
use crate::observer::{FrameConsumer, TrackedObserver};

pub(crate) type OrderLog = Rc<RefCell<Vec<&'static str>>>;

#[derive(Default)]
pub(crate) struct Recorder {
    frames: RefCell<Vec<BeginFrameArgs>>,
    paused_changes: RefCell<Vec<bool>>,
    order: Option<(&'static str, OrderLog)>,
    root: bool,
    animate_only: bool,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn root(mut self) -> Self {
        self.root = true;
        self
    }

    pub(crate) fn animate_only(mut self) -> Self {
        self.animate_only = true;
        self
    }

    pub(crate) fn logging_to(mut self, name: &'static str, log: &OrderLog) -> Self {
        self.order = Some((name, Rc::clone(log)));
        self
    }

    pub(crate) fn frames(&self) -> Vec<BeginFrameArgs> {
        self.frames.borrow().clone()
    }

    pub(crate) fn sequence_numbers(&self) -> Vec<u64> {
        self.frames.borrow().iter().map(|args| args.sequence_number()).collect()
    }

    pub(crate) fn paused_changes(&self) -> Vec<bool> {
        self.paused_changes.borrow().clone()
    }
}

impl FrameConsumer for Recorder {
    fn consume_begin_frame(&self, args: &BeginFrameArgs) -> bool {
        self.frames.borrow_mut().push(*args);
        if let Some((name, log)) = &self.order {
            log.borrow_mut().push(*name);
        }
        true
    }

    fn on_begin_frame_source_paused_changed(&self, paused: bool) {
        self.paused_changes.borrow_mut().push(paused);
    }

    fn wants_animate_only_begin_frames(&self) -> bool {
        self.animate_only
    }

    fn is_root(&self) -> bool {
        self.root
    }
}

pub(crate) type RecordingObserver = TrackedObserver<Recorder>;

pub(crate) fn observer(recorder: Recorder) -> Rc<RecordingObserver> {
    Rc::new(TrackedObserver::new(recorder))
}

pub(crate) fn context(
    clock: &Rc<ManualTickClock>,
    metrics: &Arc<MetricsCollector>,
    features: FeatureFlags,
) -> SourceContext {
    SourceContext {
        source_id: 1,
        clock: clock.clone(),
        metrics: Arc::clone(metrics),
        features,
    }
}
