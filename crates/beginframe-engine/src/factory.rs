//! Builds sources that share a clock, metrics and configuration.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use beginframe_args::NOT_RESTARTABLE_ID;

use crate::clock::TickClock;
use crate::config::SchedulerConfig;
use crate::metrics::MetricsCollector;
use crate::source::{
    BackToBackBeginFrameSource, BeginFrameSource, DelayBasedBeginFrameSource,
    ExternalBeginFrameSource, ExternalBeginFrameSourceClient, SourceContext, SourceIdAllocator,
    StubBeginFrameSource,
};
use crate::time_source::DelayBasedTimeSource;

/// Owns the id allocator and everything else sources have in common.
pub struct SourceFactory {
    config: SchedulerConfig,
    clock: Rc<dyn TickClock>,
    metrics: Arc<MetricsCollector>,
    ids: SourceIdAllocator,
}

impl SourceFactory {
    /// Create a factory with its own metrics collector.
    pub fn new(config: SchedulerConfig, clock: Rc<dyn TickClock>) -> Self {
        Self::with_metrics(config, clock, Arc::new(MetricsCollector::new()))
    }

    /// Create a factory that reports into `metrics`.
    pub fn with_metrics(
        config: SchedulerConfig,
        clock: Rc<dyn TickClock>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            config,
            clock,
            metrics,
            ids: SourceIdAllocator::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &Rc<dyn TickClock> {
        &self.clock
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    fn context(&self, restart_id: u32) -> SourceContext {
        SourceContext {
            source_id: self.ids.allocate(restart_id),
            clock: Rc::clone(&self.clock),
            metrics: Arc::clone(&self.metrics),
            features: self.config.features,
        }
    }

    pub fn create_stub(&self) -> StubBeginFrameSource {
        StubBeginFrameSource::new(self.context(NOT_RESTARTABLE_ID))
    }

    pub fn create_back_to_back(&self) -> BackToBackBeginFrameSource {
        let time_source = DelayBasedTimeSource::new(Rc::clone(&self.clock));
        let source = BackToBackBeginFrameSource::new(
            self.context(NOT_RESTARTABLE_ID),
            Box::new(time_source),
        );
        source.on_update_vsync_parameters(self.clock.now(), self.config.default_interval());
        source.set_max_vrr_interval(self.config.max_vrr_interval());
        debug!(source_id = source.source_id(), "Created back-to-back source");
        source
    }

    /// Create a delay-based source ticking at the configured interval,
    /// aligned to `timebase` (or to the first activation when `None`).
    pub fn create_delay_based(&self, timebase: Option<Instant>) -> DelayBasedBeginFrameSource {
        let time_source = DelayBasedTimeSource::with_interval(
            Rc::clone(&self.clock),
            timebase,
            self.config.default_interval(),
        );
        let source = DelayBasedBeginFrameSource::new(
            self.context(self.config.restart_id),
            Box::new(time_source),
        );
        source.set_max_vrr_interval(self.config.max_vrr_interval());
        debug!(source_id = source.source_id(), "Created delay-based source");
        source
    }

    pub fn create_external(
        &self,
        client: Box<dyn ExternalBeginFrameSourceClient>,
    ) -> ExternalBeginFrameSource {
        let source = ExternalBeginFrameSource::new(
            self.context(self.config.restart_id),
            client,
            self.config.external_latency_sample_period,
        );
        debug!(source_id = source.source_id(), "Created external source");
        source
    }
}
