//! Pool error and snapshot types.

use serde::Serialize;
use thiserror::Error;

use crate::selector::{Selection, SelectorError};

/// Errors delivered to `select` callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The selector returned an error or panicked.
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// No alive connection, and every dead one failed its probe.
    #[error("no living connections ({tried} dead connections probed)")]
    NoLivingConnections { tried: usize },

    /// `select_with` was called outside of a tokio runtime.
    #[error("no async runtime available to deliver the selection")]
    NoRuntime,
}

/// Result of one selection.
pub type SelectResult = Result<Selection, PoolError>;

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub alive: Vec<String>,
    /// In revival order.
    pub dead: Vec<DeadConnection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadConnection {
    pub host: String,
    pub deaths: u32,
    /// Time left until the revival timer fires; zero once it is due.
    pub retry_in_ms: u64,
}
