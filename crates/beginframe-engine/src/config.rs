//! Scheduler configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use beginframe_args::NOT_RESTARTABLE_ID;

use crate::error::ConfigError;
use crate::ConfigResult;

/// Behavior switches that change how sources deliver frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Kill switch: do not replay a MISSED frame to newly added observers.
    pub skip_missed_frame_on_add_observer: bool,

    /// Measure the double-tick margin against the last vsync interval the
    /// source was told about instead of the interval carried by the args.
    pub use_last_vsync_interval_for_double_tick: bool,
}

/// Configuration shared by every source built from one factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Nominal vsync interval in microseconds (default: 16667).
    pub default_interval_us: u64,

    /// Extended VRR interval in microseconds (None when VRR is off).
    pub max_vrr_interval_us: Option<u64>,

    /// Restart id stamped into the high bits of restartable source ids.
    pub restart_id: u32,

    /// Record one external latency sample per this many BeginFrames.
    pub external_latency_sample_period: u32,

    pub features: FeatureFlags,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_us: 16_667,
            max_vrr_interval_us: None,
            restart_id: NOT_RESTARTABLE_ID,
            external_latency_sample_period: 100,
            features: FeatureFlags::default(),
        }
    }
}

impl SchedulerConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), ?config, "Loaded scheduler config");
        Ok(config)
    }

    /// Check the invariants the sources rely on.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_interval_us == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if let Some(vrr_us) = self.max_vrr_interval_us {
            if vrr_us < self.default_interval_us {
                return Err(ConfigError::VrrIntervalTooShort {
                    vrr_us,
                    interval_us: self.default_interval_us,
                });
            }
        }
        if self.external_latency_sample_period == 0 {
            return Err(ConfigError::ZeroSamplePeriod);
        }
        Ok(())
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_micros(self.default_interval_us)
    }

    pub fn max_vrr_interval(&self) -> Option<Duration> {
        self.max_vrr_interval_us.map(Duration::from_micros)
    }
}
