//! Source state types.

use serde::{Deserialize, Serialize};

use crate::types::BeginFrameArgsSnapshot;

/// GPU-busy throttling state of a source.
///
/// Cycles `Idle → OneBeginFrameAfterBusySent → Throttled → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThrottleState {
    /// GPU not busy, or busy but no tick has been requested since.
    #[default]
    Idle,

    /// One tick was let through after the GPU became busy.
    OneBeginFrameAfterBusySent,

    /// Ticks are suppressed until the GPU is available again.
    Throttled,
}

impl ThrottleState {
    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::OneBeginFrameAfterBusySent => "OneBeginFrameAfterBusySent",
            Self::Throttled => "Throttled",
        }
    }
}

/// Which mechanism drives a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Never ticks.
    Stub,

    /// Ticks as soon as an observer finished its previous frame.
    BackToBack,

    /// Ticks on a vsync-aligned timer.
    DelayBased,

    /// Ticks when an upstream provider says so.
    External,
}

impl SourceKind {
    /// Returns the display name for this kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Stub => "Stub",
            Self::BackToBack => "BackToBack",
            Self::DelayBased => "DelayBased",
            Self::External => "External",
        }
    }
}

/// Debug dump of a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceStateSnapshot {
    pub source_id: u64,

    pub kind: SourceKind,

    /// Only external sources can be paused.
    pub paused: bool,

    /// Live registered observers.
    pub observer_count: usize,

    pub is_gpu_busy: bool,

    pub throttle_state: ThrottleState,

    /// Most recent args produced or accepted by the source.
    pub last_args: Option<BeginFrameArgsSnapshot>,
}
