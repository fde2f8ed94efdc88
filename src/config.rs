use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Navigation expansion settings with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompilerConfig {
    /// Longest navigation chain (in edges) a single binding may create
    #[validate(range(
        min = 1,
        max = 64,
        message = "Max navigation depth must be between 1 and 64"
    ))]
    pub max_navigation_depth: usize,

    /// Turn uncorrelated collection navigations in SelectMany into joins
    pub hoist_uncorrelated_collections: bool,

    /// Guard equality over optional navigations so absent rows never match
    pub null_safe_equality: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_navigation_depth: 16,
            hoist_uncorrelated_collections: true,
            null_safe_equality: true,
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            max_navigation_depth: parse_env_var("NAVEXPAND_MAX_NAVIGATION_DEPTH", "16")?,
            hoist_uncorrelated_collections: parse_env_var("NAVEXPAND_HOIST_COLLECTIONS", "true")?,
            null_safe_equality: parse_env_var("NAVEXPAND_NULL_SAFE_EQUALITY", "true")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content.to_string(),
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        Self::from_yaml_str(&content)
    }
}

/// Parse an environment variable with a default value. Only an unset
/// variable falls back to the default.
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = match env::var(key) {
        Ok(value) => value,
        Err(env::VarError::NotPresent) => default.to_string(),
        Err(e) => return Err(e.into()),
    };
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
