//! Commands sent from an upstream vsync provider to an external source.

use crate::args::BeginFrameArgs;

/// Commands that an upstream vsync provider can send to an external
/// source.
#[derive(Debug, Clone)]
pub enum SourceCommand {
    /// A platform vsync tick.
    BeginFrame(BeginFrameArgs),

    /// The platform paused or resumed frame production.
    SetPaused(bool),
}
