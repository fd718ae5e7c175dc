//! Error types for the pipeline.
//!
//! None of these escape the pipeline task: error containment converts every
//! [`PipelineError`] into an `ERROR_OCCURRED` event.

use crate::events::Event;
use thiserror::Error;

/// A failure while an event travels through the interceptors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The event has an empty `kind`.
    #[error("event is missing a kind")]
    MissingKind,

    /// The payload could not be serialized for keying or sizing.
    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store-apply function rejected the event.
    #[error("{0:#}")]
    Store(anyhow::Error),
}

/// Returned by [`PipelineHandle::try_dispatch`](crate::pipeline::PipelineHandle::try_dispatch)
/// with the event that could not be queued.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("pipeline inbound channel is full")]
    Full(Event),

    #[error("pipeline has been disposed")]
    Disposed(Event),
}

impl DispatchError {
    /// Take back the event that was not queued.
    pub fn into_event(self) -> Event {
        match self {
            DispatchError::Full(event) | DispatchError::Disposed(event) => event,
        }
    }
}
