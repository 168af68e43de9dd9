//! Transport seam.
//!
//! # Data Flow
//! ```text
//! Connection::ping / Connection::request
//!     → Transport (trait object owned by every connection)
//!         - http.rs (reqwest, production)
//!         - any in-memory double (tests)
//!     → Ok / TransportError
//! ```
//!
//! # Design Decisions
//! - The pool never looks inside a transport; it only sees success or failure
//! - A transport error on a request is what makes a connection report itself dead
//! - Futures are boxed so the trait stays object safe

pub mod http;

use futures_util::future::BoxFuture;
use reqwest::Method;
use thiserror::Error;

use crate::net::host::Host;

pub use http::HttpTransport;

/// Errors surfaced by a transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The node could not be reached at all.
    #[error("connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    /// The node did not answer in time.
    #[error("request to {host} timed out after {timeout_ms} ms")]
    Timeout { host: String, timeout_ms: u64 },

    /// Anything else that went wrong on the wire.
    #[error("request to {host} failed: {reason}")]
    Request { host: String, reason: String },
}

/// A request to send to one node.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Path below the host's own path prefix.
    pub path: String,
    pub body: Option<Vec<u8>>,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// What came back from a node. Any status code counts as a delivered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs probes and requests against a single node.
pub trait Transport: Send + Sync {
    /// Health probe. `Ok` means the node answered.
    fn ping<'a>(&'a self, host: &'a Host) -> BoxFuture<'a, Result<(), TransportError>>;

    /// Send a request and wait for the response.
    fn request<'a>(
        &'a self,
        host: &'a Host,
        request: TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>>;
}
