//! Events sent from an external source back to its upstream provider.

use serde::{Deserialize, Serialize};

use crate::state::SourceStateSnapshot;

/// Events that an external source can send upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceEvent {
    /// Start (`true`) or stop (`false`) producing BeginFrames.
    NeedsBeginFrames(bool),

    /// Current state of the source, for diagnostics.
    State(Box<SourceStateSnapshot>),
}
