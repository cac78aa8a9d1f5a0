//! BeginFrame sources.
//!
//! Every source fans frames out to a set of observers. They differ in what
//! makes them tick:
//! - [`StubBeginFrameSource`] never ticks.
//! - [`BackToBackBeginFrameSource`] ticks as soon as observers finish.
//! - [`DelayBasedBeginFrameSource`] ticks on a vsync-aligned timer.
//! - [`ExternalBeginFrameSource`] ticks when an upstream provider says so.

mod back_to_back;
mod delay_based;
mod external;
mod stub;
#[cfg(test)]
mod testing;

pub use back_to_back::BackToBackBeginFrameSource;
pub use delay_based::DelayBasedBeginFrameSource;
pub use external::{ExternalBeginFrameSource, ExternalBeginFrameSourceClient};
pub use stub::StubBeginFrameSource;

use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use beginframe_args::{SourceKind, SourceStateSnapshot};

use crate::clock::TickClock;
use crate::config::FeatureFlags;
use crate::metrics::MetricsCollector;
use crate::observer::BeginFrameObserver;
use crate::throttle::GpuBusyThrottle;

/// Common interface of all sources.
///
/// All methods take `&self`: observers may call back into the source while
/// it is dispatching to them.
pub trait BeginFrameSource {
    /// Unique for the lifetime of the process.
    fn source_id(&self) -> u64;

    fn kind(&self) -> SourceKind;

    /// Register an observer. The source keeps only a weak reference.
    fn add_observer(&self, observer: Rc<dyn BeginFrameObserver>);

    /// Unregister an observer. No further frames reach it.
    fn remove_observer(&self, observer: &dyn BeginFrameObserver);

    /// The observer is ready for its next frame.
    fn did_finish_frame(&self, _observer: &dyn BeginFrameObserver) {}

    /// Returns true if ticks follow a fixed cadence rather than observers.
    fn is_throttled(&self) -> bool;

    /// Report GPU back-pressure.
    fn set_is_gpu_busy(&self, busy: bool);

    /// The display's vsync parameters changed.
    fn on_update_vsync_parameters(&self, _timebase: Instant, _interval: Duration) {}

    /// Enable (`Some`) or disable (`None`) a VRR interval override.
    fn set_max_vrr_interval(&self, _max_vrr_interval: Option<Duration>) {}

    /// Debug dump of the source.
    fn state_snapshot(&self) -> SourceStateSnapshot;
}

/// Hands out process-unique source ids.
///
/// The high 32 bits carry the restart id, the low 32 bits a counter owned by
/// this allocator.
#[derive(Debug, Default)]
pub struct SourceIdAllocator {
    next: AtomicU32,
}

impl SourceIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next source id for `restart_id`.
    pub fn allocate(&self, restart_id: u32) -> u64 {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        (u64::from(restart_id) << 32) | u64::from(sequence)
    }
}

/// What every source needs from its environment.
#[derive(Clone)]
pub struct SourceContext {
    pub source_id: u64,
    pub clock: Rc<dyn TickClock>,
    pub metrics: Arc<MetricsCollector>,
    pub features: FeatureFlags,
}

impl SourceContext {
    fn throttle(&self) -> GpuBusyThrottle {
        GpuBusyThrottle::new(Rc::clone(&self.clock), Arc::clone(&self.metrics))
    }
}
