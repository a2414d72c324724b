//! Hierarchical configuration loading for the executor (spec §4.10).

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Concurrency, timeout, and runtime knobs for one executor instance.
///
/// Fields default to the values `spec.md` names explicitly (human-input
/// timeout 5 min, default convergence limit 10); the concurrency cap itself
/// is left `None` by default so [`crate::services::tool_dispatcher::ToolDispatcher`]
/// falls back to its own `min(max(4, 4*cpus), 32)` formula (spec §4.4)
/// rather than this layer picking a number out of thin air.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub concurrency_cap: Option<usize>,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_human_input_timeout_secs")]
    pub human_input_timeout_secs: u64,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: String,
    #[serde(default = "default_convergence_limit")]
    pub default_convergence_limit: i64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_human_input_timeout_secs() -> u64 {
    5 * 60
}

fn default_checkpoint_dir() -> String {
    ".vigil/checkpoints".to_string()
}

fn default_convergence_limit() -> i64 {
    10
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            concurrency_cap: None,
            tool_timeout_secs: default_tool_timeout_secs(),
            human_input_timeout_secs: default_human_input_timeout_secs(),
            debug: false,
            checkpoint_dir: default_checkpoint_dir(),
            default_convergence_limit: default_convergence_limit(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid tool_timeout_secs: {0}, must be positive")]
    InvalidToolTimeout(u64),
    #[error("invalid default_convergence_limit: {0}, must be positive")]
    InvalidConvergenceLimit(i64),
    #[error("failed to load configuration: {0}")]
    Load(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load with the spec's layering: programmatic defaults, then
    /// `vigil.yaml`, then `VIGIL_*` environment variables (highest
    /// priority), grounded on the teacher's `ConfigLoader::load`.
    pub fn load() -> Result<ExecutorConfig, ConfigError> {
        let config: ExecutorConfig = Figment::new()
            .merge(Serialized::defaults(ExecutorConfig::default()))
            .merge(Yaml::file("vigil.yaml"))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<ExecutorConfig, ConfigError> {
        let config: ExecutorConfig = Figment::new()
            .merge(Serialized::defaults(ExecutorConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &ExecutorConfig) -> Result<(), ConfigError> {
        if config.tool_timeout_secs == 0 {
            return Err(ConfigError::InvalidToolTimeout(config.tool_timeout_secs));
        }
        if config.default_convergence_limit <= 0 {
            return Err(ConfigError::InvalidConvergenceLimit(config.default_convergence_limit));
        }
        Ok(())
    }
}
