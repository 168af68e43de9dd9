//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::config::loader::ConfigError;
use crate::net::host::{EndpointSpec, Host};
use crate::pool::DEFAULT_DEAD_TIMEOUT_MS;
use crate::resilience::backoff::DEFAULT_MAX_DEAD_TIMEOUT_MS;

/// Root configuration for a connection pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Nodes to connect to.
    pub hosts: Vec<EndpointSpec>,

    /// Built-in selector name (`round_robin`, `random`).
    pub selector: String,

    /// Base dead timeout in milliseconds.
    pub dead_timeout_ms: u64,

    /// Backoff policy name (`flat`, `exponential`).
    pub calc_dead_timeout: String,

    /// Ceiling for the exponential policy in milliseconds.
    pub max_dead_timeout_ms: u64,

    /// Health probe timeout in milliseconds.
    pub ping_timeout_ms: u64,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            selector: "round_robin".to_string(),
            dead_timeout_ms: DEFAULT_DEAD_TIMEOUT_MS,
            calc_dead_timeout: "exponential".to_string(),
            max_dead_timeout_ms: DEFAULT_MAX_DEAD_TIMEOUT_MS,
            ping_timeout_ms: 3_000,
            observability: ObservabilityConfig::default(),
        }
    }
}

impl PoolConfig {
    /// Normalize every configured endpoint.
    pub fn resolve_hosts(&self) -> Result<Vec<Host>, ConfigError> {
        self.hosts
            .iter()
            .map(|spec| {
                Host::try_from(spec).map_err(|source| ConfigError::InvalidHost {
                    spec: format!("{:?}", spec),
                    source,
                })
            })
            .collect()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
