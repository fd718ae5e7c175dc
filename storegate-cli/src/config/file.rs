//! TOML file configuration structures.
//!
//! These structs directly map to the `storegate.toml` file format.

use serde::{Deserialize, Serialize};
use storegate_core::PipelineConfig;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

/// Replay behaviour section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// How long to keep the pipeline alive after the input ends so held
    /// events can fire. Defaults to the longest timer plus a margin.
    pub linger_ms: Option<u64>,
}
