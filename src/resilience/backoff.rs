//! Backoff for dead connections.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

/// Default ceiling for the exponential policy (30 minutes).
pub const DEFAULT_MAX_DEAD_TIMEOUT_MS: u64 = 1_800_000;

/// User-supplied calculator: `(deaths, base_ms) -> delay_ms`.
pub type DeadTimeoutFn = Arc<dyn Fn(u32, u64) -> u64 + Send + Sync>;

/// Unrecognized policy name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown dead timeout policy '{0}' (expected flat or exponential)")]
pub struct UnknownPolicy(pub String);

/// How long a dead connection waits before it is retried.
#[derive(Clone)]
pub enum DeadTimeout {
    /// Always the base timeout.
    Flat,
    /// `base * 2^(n/2)`, capped at `max_ms`.
    Exponential { max_ms: u64 },
    Custom(DeadTimeoutFn),
}

impl DeadTimeout {
    /// Resolve a policy by name. Fails fast on anything unknown.
    pub fn from_name(name: &str, max_ms: u64) -> Result<Self, UnknownPolicy> {
        match name {
            "flat" => Ok(DeadTimeout::Flat),
            "exponential" => Ok(DeadTimeout::Exponential { max_ms }),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(u32, u64) -> u64 + Send + Sync + 'static,
    {
        DeadTimeout::Custom(Arc::new(f))
    }

    /// Delay in milliseconds for a connection with `deaths` prior deaths.
    pub fn calc(&self, deaths: u32, base_ms: u64) -> u64 {
        match self {
            DeadTimeout::Flat => flat(deaths, base_ms),
            DeadTimeout::Exponential { max_ms } => exponential(deaths, base_ms, *max_ms),
            DeadTimeout::Custom(f) => f(deaths, base_ms),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeadTimeout::Flat => "flat",
            DeadTimeout::Exponential { .. } => "exponential",
            DeadTimeout::Custom(_) => "custom",
        }
    }
}

impl Default for DeadTimeout {
    fn default() -> Self {
        DeadTimeout::Exponential {
            max_ms: DEFAULT_MAX_DEAD_TIMEOUT_MS,
        }
    }
}

impl FromStr for DeadTimeout {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeadTimeout::from_name(s, DEFAULT_MAX_DEAD_TIMEOUT_MS)
    }
}

impl fmt::Debug for DeadTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadTimeout::Exponential { max_ms } => f
                .debug_struct("Exponential")
                .field("max_ms", max_ms)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Flat policy: the base timeout regardless of history.
pub fn flat(_deaths: u32, base_ms: u64) -> u64 {
    base_ms
}

/// Exponential policy: `min(base * 2^(deaths / 2), max)`.
pub fn exponential(deaths: u32, base_ms: u64, max_ms: u64) -> u64 {
    let growth = 2f64.powf(f64::from(deaths) * 0.5);
    let delay = (base_ms as f64 * growth).min(max_ms as f64);
    delay as u64
}
