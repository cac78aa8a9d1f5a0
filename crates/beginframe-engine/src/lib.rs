//! BeginFrame scheduling engine.
//!
//! Sources pace compositing work against vsync and fan BeginFrames out to
//! registered observers. Everything here runs on a single thread; the only
//! cross-thread piece is the channel adapter an upstream vsync provider
//! uses to drive an [`ExternalBeginFrameSource`].

mod channel;
mod clock;
mod config;
mod error;
mod factory;
mod metrics;
mod observer;
mod source;
mod throttle;
mod time_source;

pub use channel::ChannelClient;
pub use clock::{ManualTickClock, SystemTickClock, TickClock};
pub use config::{FeatureFlags, SchedulerConfig};
pub use error::{ChannelError, ConfigError};
pub use factory::SourceFactory;
pub use metrics::{
    MetricsCollector, EXTERNAL_BEGIN_FRAME_LATENCY, GPU_BUSY_DURATION, VRR_FRAME_COUNT,
};
pub use observer::{
    check_begin_frame_continuity, filter_and_issue_begin_frame, BeginFrameObserver,
    FrameConsumer, ObserverKey, TrackedObserver,
};
pub use source::{
    BackToBackBeginFrameSource, BeginFrameSource, DelayBasedBeginFrameSource,
    ExternalBeginFrameSource, ExternalBeginFrameSourceClient, SourceContext, SourceIdAllocator,
    StubBeginFrameSource,
};
pub use throttle::GpuBusyThrottle;
pub use time_source::{DelayBasedTimeSource, TimeSource};

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for the upstream channel adapter.
pub type ChannelResult<T> = Result<T, ChannelError>;
