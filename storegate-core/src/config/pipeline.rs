//! Pipeline tuning knobs.

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::events::DEFAULT_CHANNEL_BUFFER;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by [`PipelineConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("sweep_probability must be within 0.0..=1.0, got {0}")]
    SweepProbability(f64),

    #[error("array_keep_last ({keep_last}) must not exceed array_truncate_threshold ({threshold})")]
    ArrayKeepLast { keep_last: usize, threshold: usize },

    #[error("channel_buffer must be greater than zero")]
    ChannelBuffer,

    #[error("{0} contains an empty kind pattern")]
    EmptyKindPattern(&'static str),
}

/// Whether error containment emits diagnostic records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Development,
    #[default]
    Production,
}

/// Which event of a debounce burst reaches the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceMode {
    /// The first event is held; later ones in the window are discarded and
    /// the window is measured from the first dispatch.
    #[default]
    FirstWins,
    /// Each repeat replaces the held event and re-arms the timer.
    LatestWins,
}

/// How the debounce key is derived from an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebounceKey {
    /// `kind + ":" + stable serialization of payload`.
    #[default]
    KindAndPayload,
    /// The kind alone, so differing payloads coalesce too.
    Kind,
}

/// Configuration for a pipeline instance. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Substrings selecting kinds that are debounced.
    pub debounce_kinds: Vec<String>,
    pub debounce_delay_ms: u64,
    pub debounce_mode: DebounceMode,
    pub debounce_key: DebounceKey,

    /// Substrings selecting kinds that are batched.
    pub batch_kinds: Vec<String>,
    pub batch_delay_ms: u64,

    /// Arrays longer than this are truncated.
    pub array_truncate_threshold: usize,
    /// How many trailing elements a truncated array keeps.
    pub array_keep_last: usize,
    /// Objects whose serialized size exceeds this are reduced to the allow-list.
    pub object_size_threshold_bytes: usize,
    pub object_allow_list_fields: Vec<String>,

    pub cache_capacity: usize,
    /// Chance that a successful store-apply triggers a cache sweep.
    pub sweep_probability: f64,
    pub sweep_max_age_ms: u64,

    pub mode: Mode,
    /// Capacity of the inbound event channel.
    pub channel_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debounce_kinds: Vec::new(),
            debounce_delay_ms: 300,
            debounce_mode: DebounceMode::default(),
            debounce_key: DebounceKey::default(),
            batch_kinds: Vec::new(),
            batch_delay_ms: 10,
            array_truncate_threshold: 1000,
            array_keep_last: 500,
            object_size_threshold_bytes: 100_000,
            object_allow_list_fields: ["id", "name", "status", "timestamp"]
                .into_iter()
                .map(String::from)
                .collect(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            sweep_probability: 0.01,
            sweep_max_age_ms: 300_000,
            mode: Mode::default(),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
        }
    }
}

impl PipelineConfig {
    /// Check values that serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sweep_probability) {
            return Err(ConfigError::SweepProbability(self.sweep_probability));
        }
        if self.array_keep_last > self.array_truncate_threshold {
            return Err(ConfigError::ArrayKeepLast {
                keep_last: self.array_keep_last,
                threshold: self.array_truncate_threshold,
            });
        }
        if self.channel_buffer == 0 {
            return Err(ConfigError::ChannelBuffer);
        }
        // An empty pattern would match every kind.
        if self.debounce_kinds.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyKindPattern("debounce_kinds"));
        }
        if self.batch_kinds.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyKindPattern("batch_kinds"));
        }
        Ok(())
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn sweep_max_age(&self) -> Duration {
        Duration::from_millis(self.sweep_max_age_ms)
    }

    pub fn is_development(&self) -> bool {
        self.mode == Mode::Development
    }
}
