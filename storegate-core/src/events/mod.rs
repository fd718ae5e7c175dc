//! Event model and inbound channel plumbing.
//!
//! # Event Flow
//!
//! 1. A producer hands an `Event` to a `PipelineHandle`
//! 2. The pipeline task runs it through error containment
//! 3. Debounce gate -> payload shrinker -> batch aggregator
//! 4. Whatever survives reaches the store-apply function
//!
//! Timer-held events (debounce, batch) resume at the stage that held them.

pub mod channels;
pub mod types;

pub use channels::{DEFAULT_CHANNEL_BUFFER, EventReceiver, EventSender, event_channel};
pub use types::{Coalescing, ERROR_OCCURRED, Event};
