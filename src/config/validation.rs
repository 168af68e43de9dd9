//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0)
//! - Check named options and host addresses resolve
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PoolConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::PoolConfig;
use crate::net::host::Host;
use crate::resilience::backoff::DeadTimeout;
use crate::selector::Selector;

/// A single semantic problem in a configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("{0}")]
    UnknownName(String),

    #[error("host #{index}: {reason}")]
    Host { index: usize, reason: String },
}

pub fn validate_config(config: &PoolConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("dead_timeout_ms", config.dead_timeout_ms),
        ("max_dead_timeout_ms", config.max_dead_timeout_ms),
        ("ping_timeout_ms", config.ping_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if let Err(e) = DeadTimeout::from_name(&config.calc_dead_timeout, config.max_dead_timeout_ms) {
        errors.push(ValidationError::UnknownName(e.to_string()));
    }
    if let Err(e) = Selector::from_name(&config.selector) {
        errors.push(ValidationError::UnknownName(e.to_string()));
    }

    for (index, spec) in config.hosts.iter().enumerate() {
        if let Err(e) = Host::try_from(spec) {
            errors.push(ValidationError::Host {
                index,
                reason: e.to_string(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::host::EndpointSpec;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&PoolConfig::default()).is_ok());
    }

    #[test]
    fn bad_host_is_reported_with_index() {
        let config = PoolConfig {
            hosts: vec![
                EndpointSpec::Address("localhost:9200".into()),
                EndpointSpec::Address("ftp://files".into()),
            ],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ValidationError::Host { index: 1, .. }));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let config = PoolConfig {
            ping_timeout_ms: 0,
            max_dead_timeout_ms: 0,
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::Zero { field: "max_dead_timeout_ms" },
                ValidationError::Zero { field: "ping_timeout_ms" },
            ]
        );
    }
}
