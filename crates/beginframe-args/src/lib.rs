//! BeginFrame value types shared by sources, observers and upstream
//! vsync providers.
//!
//! This crate defines the per-frame metadata handed out by every source,
//! the sequence-number generator used by synthetic sources, the debug
//! snapshot types, and the messages used to drive an external source from
//! another thread.

mod args;
mod commands;
mod events;
mod generator;
mod state;
mod types;

pub use args::{
    default_interval, ArgsType, BeginFrameArgs, BeginFrameId, INVALID_FRAME_NUMBER,
    MANUAL_SOURCE_ID, NOT_RESTARTABLE_ID, STARTING_FRAME_NUMBER,
};
pub use commands::SourceCommand;
pub use events::SourceEvent;
pub use generator::BeginFrameArgsGenerator;
pub use state::{SourceKind, SourceStateSnapshot, ThrottleState};
pub use types::{BeginFrameArgsSnapshot, HistogramSnapshot, MetricsSnapshot};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (upstream → source).
pub const COMMAND_CHANNEL_CAPACITY: usize = 8;

/// Channel capacity for events (source → upstream).
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<SourceCommand>, Receiver<SourceCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<SourceEvent>, Receiver<SourceEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
