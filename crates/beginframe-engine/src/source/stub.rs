//! A source that never ticks.

use std::cell::RefCell;
use std::rc::Rc;

use beginframe_args::{SourceKind, SourceStateSnapshot};

use super::{BeginFrameSource, SourceContext};
use crate::observer::BeginFrameObserver;
use crate::throttle::GpuBusyThrottle;

/// Ignores its observers. Used where a source is required but frames are
/// never wanted, e.g. headless contexts.
pub struct StubBeginFrameSource {
    source_id: u64,
    throttle: RefCell<GpuBusyThrottle>,
}

impl StubBeginFrameSource {
    pub fn new(context: SourceContext) -> Self {
        Self {
            source_id: context.source_id,
            throttle: RefCell::new(context.throttle()),
        }
    }
}

impl BeginFrameSource for StubBeginFrameSource {
    fn source_id(&self) -> u64 {
        self.source_id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Stub
    }

    fn add_observer(&self, _observer: Rc<dyn BeginFrameObserver>) {}

    fn remove_observer(&self, _observer: &dyn BeginFrameObserver) {}

    fn is_throttled(&self) -> bool {
        true
    }

    fn set_is_gpu_busy(&self, busy: bool) {
        // Nothing is ever suppressed, so there is nothing to redeliver.
        self.throttle.borrow_mut().set_is_gpu_busy(busy);
    }

    fn state_snapshot(&self) -> SourceStateSnapshot {
        let throttle = self.throttle.borrow();
        SourceStateSnapshot {
            source_id: self.source_id,
            kind: SourceKind::Stub,
            paused: false,
            observer_count: 0,
            is_gpu_busy: throttle.is_gpu_busy(),
            throttle_state: throttle.state(),
            last_args: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    use crate::clock::ManualTickClock;
    use crate::config::FeatureFlags;
    use crate::metrics::MetricsCollector;
    use crate::source::testing::{context, observer, Recorder};

    #[test]
    fn test_stub_ignores_observers() {
        let clock = Rc::new(ManualTickClock::new());
        let metrics = Arc::new(MetricsCollector::new());
        let source = StubBeginFrameSource::new(context(&clock, &metrics, FeatureFlags::default()));
        let obs = observer(Recorder::new());

        source.add_observer(obs.clone());
        source.did_finish_frame(&*obs);
        source.set_is_gpu_busy(true);
        source.remove_observer(&*obs);

        assert!(obs.consumer().paused_changes().is_empty());
        assert!(obs.consumer().frames().is_empty());

        let snapshot = source.state_snapshot();
        assert_eq!(snapshot.kind, SourceKind::Stub);
        assert_eq!(snapshot.observer_count, 0);
        assert!(snapshot.is_gpu_busy);
        assert!(snapshot.last_args.is_none());
        assert!(source.is_throttled());
    }
}
