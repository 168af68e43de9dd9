//! Connection pool for a cluster of equivalent nodes.
//!
//! Tracks which nodes are alive or dead, picks a node per request through a
//! pluggable selector, and revives dead nodes with backed-off health probes.

pub mod config;
pub mod net;
pub mod observability;
pub mod pool;
pub mod resilience;
pub mod selector;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PoolConfig;
pub use net::{Connection, Host, Status};
pub use pool::{Pool, PoolBuilder, PoolError};
pub use resilience::DeadTimeout;
pub use selector::{Selector, SelectorError};
pub use transport::{Transport, TransportError};
