//! Configuration layering.
//!
//! Sources, lowest precedence first: an optional TOML file, `FLEETBATCH_*`
//! environment variables, then explicit overrides (command-line flags).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

use super::{types::BatchConfig, ConfigError};
use crate::planner::BatchSize;

/// Prefix of environment variables read as configuration keys.
pub const ENV_PREFIX: &str = "FLEETBATCH_";

/// Values that take precedence over the file and the environment.
///
/// Unset fields leave the lower layers untouched; `quiet` and `fail_hard`
/// can only switch a setting on.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<BatchSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gather_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_wait_secs: Option<u64>,
    #[serde(skip_serializing_if = "is_false")]
    pub quiet: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub fail_hard: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<BatchConfig, ConfigError> {
    load_layered(Some(path), &ConfigOverrides::default())
}

/// Merge every configuration source into a `BatchConfig`.
///
/// Without a file, `target` and `function` must come from the environment
/// or from `overrides`.
pub fn load_layered(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<BatchConfig, ConfigError> {
    let mut figment = Figment::new();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(overrides))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<BatchConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
