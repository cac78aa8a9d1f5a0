//! Sequence-number generator for synthetic sources.

use std::time::{Duration, Instant};

use crate::args::{ArgsType, BeginFrameArgs, STARTING_FRAME_NUMBER};

/// Share of the interval tolerated as timing jitter when counting ticks.
const ERROR_MARGIN_INTERVAL_PCT: f64 = 0.05;

/// Produces args whose sequence numbers account for ticks the caller
/// skipped, e.g. while the GPU was busy.
#[derive(Debug, Clone)]
pub struct BeginFrameArgsGenerator {
    next_sequence_number: u64,
    next_expected_frame_time: Option<Instant>,
}

impl BeginFrameArgsGenerator {
    /// Create a generator with no baseline yet.
    pub fn new() -> Self {
        Self {
            next_sequence_number: STARTING_FRAME_NUMBER,
            next_expected_frame_time: None,
        }
    }

    /// Generate args for a tick at `frame_time`.
    ///
    /// `frame_time` must not go backwards between calls. `next_frame_time`
    /// is when the following tick is expected and doubles as the deadline.
    pub fn generate(
        &mut self,
        source_id: u64,
        frame_time: Instant,
        next_frame_time: Instant,
        vsync_interval: Duration,
    ) -> BeginFrameArgs {
        let sequence_number = self.next_sequence_number
            + estimate_tick_counts_between(
                frame_time,
                self.next_expected_frame_time,
                vsync_interval,
            );
        self.next_expected_frame_time = Some(next_frame_time);
        self.next_sequence_number = sequence_number + 1;

        BeginFrameArgs::new(
            source_id,
            sequence_number,
            frame_time,
            next_frame_time,
            vsync_interval,
            ArgsType::Normal,
        )
    }
}

impl Default for BeginFrameArgsGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole ticks between the expected and the actual frame time.
fn estimate_tick_counts_between(
    frame_time: Instant,
    next_expected_frame_time: Option<Instant>,
    vsync_interval: Duration,
) -> u64 {
    let Some(next_expected_frame_time) = next_expected_frame_time else {
        return 0;
    };
    if vsync_interval.is_zero() {
        return 0;
    }

    let error_margin = vsync_interval.mul_f64(ERROR_MARGIN_INTERVAL_PCT);
    // Early frames saturate to zero.
    let late_by = (frame_time + error_margin).saturating_duration_since(next_expected_frame_time);
    (late_by.as_nanos() / vsync_interval.as_nanos()) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE_ID: u64 = 42;

    fn interval() -> Duration {
        Duration::from_millis(16)
    }

    #[test]
    fn test_first_call_starts_at_starting_frame_number() {
        let mut generator = BeginFrameArgsGenerator::new();
        let t0 = Instant::now();

        let args = generator.generate(SOURCE_ID, t0, t0 + interval(), interval());

        assert_eq!(args.sequence_number(), STARTING_FRAME_NUMBER);
        assert_eq!(args.source_id(), SOURCE_ID);
        assert_eq!(args.deadline, t0 + interval());
        assert_eq!(args.args_type, ArgsType::Normal);
    }

    #[test]
    fn test_sequence_numbers_strictly_increase() {
        let mut generator = BeginFrameArgsGenerator::new();
        let t0 = Instant::now();
        let mut previous = 0;

        // Irregular but non-decreasing frame times, including a double tick.
        let offsets_ms = [0, 16, 16, 20, 33, 90, 91, 107];
        for offset in offsets_ms {
            let frame_time = t0 + Duration::from_millis(offset);
            let args = generator.generate(SOURCE_ID, frame_time, frame_time + interval(), interval());
            assert!(args.sequence_number() > previous);
            previous = args.sequence_number();
        }
    }

    #[test]
    fn test_skipped_ticks_advance_sequence_number() {
        let mut generator = BeginFrameArgsGenerator::new();
        let t0 = Instant::now();
        let first = generator.generate(SOURCE_ID, t0, t0 + interval(), interval());

        // Three whole ticks past the previous deadline.
        let frame_time = first.deadline + interval() * 3;
        let args = generator.generate(SOURCE_ID, frame_time, frame_time + interval(), interval());

        assert_eq!(args.sequence_number(), first.sequence_number() + 1 + 3);
    }

    #[test]
    fn test_jitter_within_margin_is_not_a_skip() {
        let mut generator = BeginFrameArgsGenerator::new();
        let t0 = Instant::now();
        let first = generator.generate(SOURCE_ID, t0, t0 + interval(), interval());

        // Slightly early for the expected tick.
        let frame_time = first.deadline - Duration::from_micros(500);
        let args = generator.generate(SOURCE_ID, frame_time, frame_time + interval(), interval());
        assert_eq!(args.sequence_number(), first.sequence_number() + 1);

        // Just short of one more whole tick: the 5% margin counts it.
        let frame_time = args.deadline + interval() - Duration::from_micros(500);
        let late = generator.generate(SOURCE_ID, frame_time, frame_time + interval(), interval());
        assert_eq!(late.sequence_number(), args.sequence_number() + 2);
    }

    #[test]
    fn test_early_frame_counts_no_ticks() {
        let mut generator = BeginFrameArgsGenerator::new();
        let t0 = Instant::now();
        let first = generator.generate(SOURCE_ID, t0, t0 + interval(), interval());

        let frame_time = t0 + Duration::from_millis(2);
        let args = generator.generate(SOURCE_ID, frame_time, frame_time + interval(), interval());
        assert_eq!(args.sequence_number(), first.sequence_number() + 1);
    }
}
