//! Configuration types for the interceptor pipeline.
//!
//! These types are plain data with serde defaults so a host can load them
//! from any format. File loading itself lives in the host binary.

mod classify;
mod pipeline;

pub use classify::KindClassifier;
pub use pipeline::{ConfigError, DebounceKey, DebounceMode, Mode, PipelineConfig};
