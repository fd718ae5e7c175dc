//! The interceptor stages, in pipeline order:
//!
//! - `ErrorContainment`: converts failures into `ERROR_OCCURRED` events
//! - `DebounceGate`: holds repeats of a debounce key behind a timer
//! - `PayloadShrinker`: truncates or strips oversized payloads
//! - `BatchAggregator`: queues batchable events until the stream goes quiet
//!
//! Stages are synchronous and own no timers; they report deadlines that the
//! pipeline task sleeps towards.

pub mod batch;
pub mod containment;
pub mod debounce;
pub mod shrink;

pub use batch::BatchAggregator;
pub use containment::{DevLogger, DiagnosticRecord, ErrorContainment, FailureContext};
pub use debounce::{DebounceGate, DebounceOutcome};
pub use shrink::{PayloadShrinker, ShrinkOutcome};
