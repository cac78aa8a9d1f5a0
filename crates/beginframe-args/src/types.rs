//! Serializable views used for diagnostics.

use serde::{Deserialize, Serialize};

use crate::args::ArgsType;

/// Serializable view of one `BeginFrameArgs`.
///
/// Monotonic timestamps have no absolute meaning, so they are expressed
/// relative to the moment the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginFrameArgsSnapshot {
    pub source_id: u64,
    pub sequence_number: u64,
    pub args_type: ArgsType,
    pub animate_only: bool,
    pub interval_us: u64,

    /// How long ago the frame started.
    pub frame_time_age_us: u64,

    /// Time left until the deadline (zero once it passed).
    pub deadline_in_us: u64,
}

/// Summary of one named histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    /// Histogram name (e.g., "GPU.GpuBusyDuration").
    pub name: String,

    /// Number of samples recorded.
    pub count: u64,

    /// Sum of all samples.
    pub sum: u64,

    /// Smallest sample.
    pub min: u64,

    /// Largest sample.
    pub max: u64,
}

impl HistogramSnapshot {
    /// Mean of the recorded samples, or zero when empty.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

/// All histograms recorded so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub histograms: Vec<HistogramSnapshot>,
}

impl MetricsSnapshot {
    /// Find a histogram by name.
    pub fn histogram(&self, name: &str) -> Option<&HistogramSnapshot> {
        self.histograms.iter().find(|h| h.name == name)
    }
}
