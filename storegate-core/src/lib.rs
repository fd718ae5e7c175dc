#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod interceptors;
pub mod pipeline;
pub mod store;

pub use cache::ExpiringCache;
pub use config::{DebounceKey, DebounceMode, Mode, PipelineConfig};
pub use error::{DispatchError, PipelineError};
pub use events::{Coalescing, ERROR_OCCURRED, Event};
pub use interceptors::DiagnosticRecord;
pub use pipeline::{Pipeline, PipelineHandle, PipelineStats, spawn_pipeline};
pub use store::{RandomSampler, StoreApply, SweepSampler};
