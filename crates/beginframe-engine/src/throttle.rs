//! GPU-busy throttling shared by every source.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use beginframe_args::ThrottleState;

use crate::clock::TickClock;
use crate::metrics::{MetricsCollector, GPU_BUSY_DURATION};

/// Lets exactly one tick through after the GPU reports busy, then
/// suppresses ticks until it is available again.
pub struct GpuBusyThrottle {
    clock: Rc<dyn TickClock>,
    metrics: Arc<MetricsCollector>,
    is_gpu_busy: bool,
    state: ThrottleState,
    gpu_busy_start_time: Option<Instant>,
}

impl GpuBusyThrottle {
    pub fn new(clock: Rc<dyn TickClock>, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            clock,
            metrics,
            is_gpu_busy: false,
            state: ThrottleState::Idle,
            gpu_busy_start_time: None,
        }
    }

    /// Update the GPU state.
    ///
    /// Returns true if a tick was suppressed while busy, in which case the
    /// owning source must redeliver it now.
    pub fn set_is_gpu_busy(&mut self, busy: bool) -> bool {
        if self.is_gpu_busy == busy {
            return false;
        }
        self.is_gpu_busy = busy;

        if busy {
            debug_assert_eq!(self.state, ThrottleState::Idle);
            self.gpu_busy_start_time = Some(self.clock.now());
            return false;
        }

        let was_throttled = self.state == ThrottleState::Throttled;
        self.state = ThrottleState::Idle;
        if !was_throttled {
            return false;
        }

        if let Some(start) = self.gpu_busy_start_time.take() {
            let busy_for = self.clock.now().saturating_duration_since(start);
            self.metrics.record_duration(GPU_BUSY_DURATION, busy_for);
            debug!(busy_us = busy_for.as_micros() as u64, "GPU available, releasing throttle");
        }
        true
    }

    /// Called right before a source would dispatch a tick. Returns true if
    /// the tick must be held back until the GPU is available.
    pub fn request_callback_on_gpu_available(&mut self) -> bool {
        if !self.is_gpu_busy {
            debug_assert_eq!(self.state, ThrottleState::Idle);
            return false;
        }

        match self.state {
            ThrottleState::Idle => {
                // Let one frame through so a pending frame can flush.
                self.state = ThrottleState::OneBeginFrameAfterBusySent;
                false
            }
            ThrottleState::OneBeginFrameAfterBusySent => {
                debug!("GPU busy, throttling BeginFrames");
                self.state = ThrottleState::Throttled;
                true
            }
            ThrottleState::Throttled => true,
        }
    }

    pub fn is_gpu_busy(&self) -> bool {
        self.is_gpu_busy
    }

    pub fn state(&self) -> ThrottleState {
        self.state
    }
}
