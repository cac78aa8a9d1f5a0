//! Per-frame metadata.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::types::BeginFrameArgsSnapshot;

/// Restart id for sources whose ids never have to be told apart across
/// restarts of the producing process.
pub const NOT_RESTARTABLE_ID: u32 = 0;

/// Source id carried by args that were built by hand rather than by a
/// source.
pub const MANUAL_SOURCE_ID: u64 = u32::MAX as u64;

/// Sequence number that never belongs to a delivered frame.
pub const INVALID_FRAME_NUMBER: u64 = 0;

/// First sequence number handed out by any source.
pub const STARTING_FRAME_NUMBER: u64 = 1;

/// Interval used when nothing better is known (60Hz).
pub fn default_interval() -> Duration {
    Duration::from_micros(16_667)
}

/// Identifies one frame of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BeginFrameId {
    /// High 32 bits: restart id. Low 32 bits: per-process source sequence.
    pub source_id: u64,

    /// Increases by at least one for every frame of the same source.
    pub sequence_number: u64,
}

impl BeginFrameId {
    /// Create a new frame id.
    pub fn new(source_id: u64, sequence_number: u64) -> Self {
        Self {
            source_id,
            sequence_number,
        }
    }

    /// Returns true if `self` comes after `other` from the same source.
    pub fn is_next_in_sequence_to(&self, other: &BeginFrameId) -> bool {
        self.source_id == other.source_id && self.sequence_number > other.sequence_number
    }

    /// Returns true if the sequence number was handed out by a source.
    pub fn is_sequence_valid(&self) -> bool {
        self.sequence_number >= STARTING_FRAME_NUMBER
    }
}

/// How a frame reached the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArgsType {
    /// Delivered on the tick it was produced for.
    #[default]
    Normal,

    /// Replay of an earlier tick for an observer that joined late.
    Missed,
}

impl ArgsType {
    /// Returns the display name for this type.
    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Missed => "MISSED",
        }
    }
}

/// One frame-production opportunity.
///
/// A plain value: sources build a fresh one per tick and observers keep
/// copies of the ones they used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginFrameArgs {
    pub frame_id: BeginFrameId,

    /// Start of this frame's work.
    pub frame_time: Instant,

    /// Latest time output should be ready. Advisory only.
    pub deadline: Instant,

    /// Expected time to the next frame.
    pub interval: Duration,

    pub args_type: ArgsType,

    /// Frame only drives animations and input.
    pub animate_only: bool,
}

impl BeginFrameArgs {
    /// Create args for a freshly produced frame.
    pub fn new(
        source_id: u64,
        sequence_number: u64,
        frame_time: Instant,
        deadline: Instant,
        interval: Duration,
        args_type: ArgsType,
    ) -> Self {
        debug_assert!(sequence_number >= STARTING_FRAME_NUMBER);
        Self {
            frame_id: BeginFrameId::new(source_id, sequence_number),
            frame_time,
            deadline,
            interval,
            args_type,
            animate_only: false,
        }
    }

    pub fn source_id(&self) -> u64 {
        self.frame_id.source_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.frame_id.sequence_number
    }

    /// Returns true if these args may be delivered to an observer.
    pub fn is_valid(&self) -> bool {
        self.frame_id.is_sequence_valid()
    }

    /// Returns a copy retyped as a replay of this frame.
    pub fn as_missed(&self) -> Self {
        Self {
            args_type: ArgsType::Missed,
            ..*self
        }
    }

    /// Returns a copy with the animate-only flag set to `animate_only`.
    pub fn with_animate_only(&self, animate_only: bool) -> Self {
        Self {
            animate_only,
            ..*self
        }
    }

    /// Serializable view of these args, with times expressed relative to
    /// `now`.
    pub fn snapshot(&self, now: Instant) -> BeginFrameArgsSnapshot {
        BeginFrameArgsSnapshot {
            source_id: self.source_id(),
            sequence_number: self.sequence_number(),
            args_type: self.args_type,
            animate_only: self.animate_only,
            interval_us: self.interval.as_micros() as u64,
            frame_time_age_us: now.saturating_duration_since(self.frame_time).as_micros() as u64,
            deadline_in_us: self.deadline.saturating_duration_since(now).as_micros() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_in_sequence_requires_same_source() {
        let a = BeginFrameId::new(1, 5);
        let b = BeginFrameId::new(1, 6);
        let other_source = BeginFrameId::new(2, 9);

        assert!(b.is_next_in_sequence_to(&a));
        assert!(!a.is_next_in_sequence_to(&b));
        assert!(!a.is_next_in_sequence_to(&a));
        assert!(!other_source.is_next_in_sequence_to(&a));
    }

    #[test]
    fn test_invalid_frame_number() {
        assert!(!BeginFrameId::new(1, INVALID_FRAME_NUMBER).is_sequence_valid());
        assert!(BeginFrameId::new(1, STARTING_FRAME_NUMBER).is_sequence_valid());
    }

    #[test]
    fn test_as_missed_keeps_frame_id() {
        let now = Instant::now();
        let interval = default_interval();
        let args = BeginFrameArgs::new(7, 3, now, now + interval, interval, ArgsType::Normal);
        let missed = args.as_missed();

        assert_eq!(missed.args_type, ArgsType::Missed);
        assert_eq!(missed.frame_id, args.frame_id);
        assert_eq!(missed.frame_time, args.frame_time);
    }

    #[test]
    fn test_snapshot_reports_relative_times() {
        let t0 = Instant::now();
        let interval = Duration::from_millis(16);
        let args = BeginFrameArgs::new(1, 1, t0, t0 + interval, interval, ArgsType::Normal);

        let snapshot = args.snapshot(t0 + Duration::from_millis(4));
        assert_eq!(snapshot.frame_time_age_us, 4_000);
        assert_eq!(snapshot.deadline_in_us, 12_000);
        assert_eq!(snapshot.interval_us, 16_000);
    }
}
