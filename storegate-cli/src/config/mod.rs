//! Configuration module for the storegate CLI.
//!
//! Handles loading the pipeline configuration from a TOML file and applying
//! command-line overrides on top of it.

pub mod file;

use crate::config::file::FileConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storegate_core::{Mode, PipelineConfig};
use thiserror::Error;

/// Margin added to the longest pipeline timer when no linger is configured.
const LINGER_MARGIN: Duration = Duration::from_millis(50);

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(#[from] storegate_core::config::ConfigError),
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub development: bool,
    pub linger_ms: Option<u64>,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub pipeline: PipelineConfig,
    pub linger: Duration,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    overrides: Overrides,
}

impl ConfigLoader {
    /// Create a new config loader. Without a path the defaults are used.
    pub fn new(config_path: Option<&Path>, overrides: Overrides) -> Self {
        Self {
            config_path: config_path.map(Path::to_path_buf),
            overrides,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file, if one was given
    /// 2. Apply CLI overrides
    /// 3. Validate the pipeline configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match &self.config_path {
            Some(path) => {
                let content =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::IoError {
                        path: path.clone(),
                        source,
                    })?;
                toml::from_str(&content)?
            }
            None => FileConfig::default(),
        };
        self.build(file_config)
    }

    fn build(&self, file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        let mut pipeline = file_config.pipeline;
        if self.overrides.development {
            pipeline.mode = Mode::Development;
        }
        pipeline.validate()?;

        let linger = self
            .overrides
            .linger_ms
            .or(file_config.replay.linger_ms)
            .map(Duration::from_millis)
            .unwrap_or_else(|| default_linger(&pipeline));

        Ok(LoadedConfig { pipeline, linger })
    }
}

/// Long enough for any event held at end of input to be released.
fn default_linger(pipeline: &PipelineConfig) -> Duration {
    pipeline.debounce_delay().max(pipeline.batch_delay()) + LINGER_MARGIN
}
