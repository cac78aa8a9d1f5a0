//! Error types for the engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading a scheduler configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config text is not valid JSON for the schema.
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The nominal interval must be non-zero.
    #[error("Vsync interval must be non-zero")]
    ZeroInterval,

    /// A VRR interval only ever extends the nominal one.
    #[error("Max VRR interval ({vrr_us}us) is shorter than the vsync interval ({interval_us}us)")]
    VrrIntervalTooShort { vrr_us: u64, interval_us: u64 },

    /// Sampling period of zero would never sample.
    #[error("Sample period must be at least 1")]
    ZeroSamplePeriod,
}

/// Errors that can occur on the upstream channel of an external source.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The upstream provider went away.
    #[error("Channel disconnected")]
    Disconnected,

    /// The upstream provider is not draining events.
    #[error("Channel full")]
    Full,
}
