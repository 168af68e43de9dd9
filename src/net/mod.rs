//! Node addressing and managed connections.
//!
//! # Data Flow
//! ```text
//! address spec (string / fields)
//!     → host.rs (normalize, canonical identity)
//!     → connection.rs (status machine + transport handle)
//!     → owned by the pool, keyed by identity
//! ```
//!
//! # Design Decisions
//! - Identity is a string so it can key maps and appear in logs as-is
//! - Connections are shared as `Arc<Connection>`; the pool is the only writer of
//!   membership, anyone holding the Arc may report status

pub mod connection;
pub mod host;

pub use connection::{Connection, ConnectionId, Status, StatusChange, StatusListener};
pub use host::{EndpointFields, EndpointSpec, Host, HostError, Scheme};
