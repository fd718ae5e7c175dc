//! Event channel factories and handles.
//!
//! The pipeline task is fed through a single bounded channel so that a
//! burst of producers is throttled instead of growing memory without limit.

use super::types::Event;
use tokio::sync::mpsc;

/// Default buffer size for the pipeline's inbound channel.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for inbound events.
pub type EventSender = mpsc::Sender<Event>;
/// Receiver handle for inbound events.
pub type EventReceiver = mpsc::Receiver<Event>;

/// Create a new inbound event channel.
///
/// Returns a (sender, receiver) pair. A zero buffer is bumped to one since
/// tokio rejects empty bounded channels.
pub fn event_channel(buffer: usize) -> (EventSender, EventReceiver) {
    mpsc::channel(buffer.max(1))
}
