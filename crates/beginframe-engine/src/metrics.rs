//! Histogram collection and reporting.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

use beginframe_args::{HistogramSnapshot, MetricsSnapshot};

/// How long the GPU stayed busy after throttling engaged, in microseconds.
pub const GPU_BUSY_DURATION: &str = "GPU.GpuBusyDuration";

/// Ticks a delay-based source produced while VRR was active.
pub const VRR_FRAME_COUNT: &str = "Viz.DelayBasedBeginFrameSource.VrrFrameCount";

/// Delay between an external frame's frame time and its arrival, in
/// microseconds.
pub const EXTERNAL_BEGIN_FRAME_LATENCY: &str = "Viz.ExternalBeginFrameSource.BeginFrameLatency";

#[derive(Debug, Clone, Copy)]
struct Histogram {
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl Histogram {
    fn new(sample: u64) -> Self {
        Self {
            count: 1,
            sum: sample,
            min: sample,
            max: sample,
        }
    }

    fn add(&mut self, sample: u64) {
        self.count += 1;
        self.sum = self.sum.saturating_add(sample);
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
    }
}

/// Collects named histogram samples emitted by sources.
pub struct MetricsCollector {
    histograms: RwLock<BTreeMap<&'static str, Histogram>>,
    sample_counter: AtomicU64,
}

impl MetricsCollector {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            histograms: RwLock::new(BTreeMap::new()),
            sample_counter: AtomicU64::new(0),
        }
    }

    /// Record a raw sample.
    pub fn record(&self, name: &'static str, sample: u64) {
        self.histograms
            .write()
            .entry(name)
            .and_modify(|histogram| histogram.add(sample))
            .or_insert_with(|| Histogram::new(sample));
    }

    /// Record a duration in microseconds.
    pub fn record_duration(&self, name: &'static str, duration: Duration) {
        self.record(name, duration.as_micros() as u64);
    }

    /// Returns true once every `period` calls, starting with the first.
    pub fn should_sample(&self, period: u32) -> bool {
        let n = self.sample_counter.fetch_add(1, Ordering::Relaxed);
        period <= 1 || n % u64::from(period) == 0
    }

    /// Number of samples recorded under `name`.
    pub fn sample_count(&self, name: &str) -> u64 {
        self.histograms.read().get(name).map_or(0, |h| h.count)
    }

    /// Get a snapshot of one histogram.
    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms
            .read()
            .get_key_value(name)
            .map(|(name, histogram)| to_snapshot(name, histogram))
    }

    /// Get a snapshot of every histogram.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let histograms = self
            .histograms
            .read()
            .iter()
            .map(|(name, histogram)| to_snapshot(name, histogram))
            .collect();
        MetricsSnapshot { histograms }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn to_snapshot(name: &str, histogram: &Histogram) -> HistogramSnapshot {
    HistogramSnapshot {
        name: name.to_string(),
        count: histogram.count,
        sum: histogram.sum,
        min: histogram.min,
        max: histogram.max,
    }
}
