//! Observer interface for session events.

use async_trait::async_trait;

use crate::channel::Channel;

/// External observer notified of connection-state changes and refreshed
/// strength values.
///
/// Implemented by the embedding service/GUI layer. All methods default to
/// no-ops so implementors only handle what they care about. Callbacks run on
/// the session task; keep them short.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// The transport became usable or stopped being usable.
    async fn connection_changed(&self, _connected: bool) {}

    /// The device echoed fresh output strengths.
    async fn strength_changed(&self, _strength_a: u8, _strength_b: u8) {}

    /// A channel in once-mode playback exhausted its queue.
    async fn playback_finished(&self, _channel: Channel) {}
}

/// Sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {}
