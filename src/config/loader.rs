//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::PoolConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::net::host::HostError;
use crate::resilience::backoff::UnknownPolicy;
use crate::selector::UnknownSelector;

/// Error type for configuration loading and pool construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    UnknownDeadTimeoutPolicy(#[from] UnknownPolicy),

    #[error(transparent)]
    UnknownSelector(#[from] UnknownSelector),

    #[error("invalid host {spec}: {source}")]
    InvalidHost {
        spec: String,
        #[source]
        source: HostError,
    },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<PoolConfig, ConfigError> {
    let config: PoolConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PoolConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
