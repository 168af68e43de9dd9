//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connection reported dead:
//!     → backoff.rs (death count + base timeout → delay)
//!     → pool schedules a revival timer at now + delay
//! ```
//!
//! # Design Decisions
//! - One policy per pool, chosen at construction
//! - The exponential policy is capped so a dead node is always retried eventually

pub mod backoff;

pub use backoff::{DeadTimeout, UnknownPolicy, DEFAULT_MAX_DEAD_TIMEOUT_MS};
