//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pool state transitions:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (gauges and counters via the `metrics` facade)
//!
//! Consumers:
//!     → Whatever subscriber / recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a metrics exporter
//! - Logging setup is only done by the binary

pub mod logging;
pub mod metrics;
