//! Bridges an external source to an upstream provider on another thread.

use crossbeam_channel::{Sender, TrySendError};
use tracing::warn;

use beginframe_args::SourceEvent;

use crate::error::ChannelError;
use crate::source::ExternalBeginFrameSourceClient;
use crate::ChannelResult;

/// Client that forwards source requests as [`SourceEvent`]s.
pub struct ChannelClient {
    events: Sender<SourceEvent>,
}

impl ChannelClient {
    pub fn new(events: Sender<SourceEvent>) -> Self {
        Self { events }
    }

    /// Send an event without blocking the compositor thread.
    pub fn send(&self, event: SourceEvent) -> ChannelResult<()> {
        self.events.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Full,
            TrySendError::Disconnected(_) => ChannelError::Disconnected,
        })
    }
}

impl ExternalBeginFrameSourceClient for ChannelClient {
    fn on_needs_begin_frames(&self, needs_begin_frames: bool) {
        if let Err(e) = self.send(SourceEvent::NeedsBeginFrames(needs_begin_frames)) {
            warn!("Failed to send event: {}", e);
        }
    }
}
