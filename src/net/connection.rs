//! Managed connection state machine.
//!
//! # Responsibilities
//! - Own one endpoint and its tri-state status (Alive / Dead / Closed)
//! - Count deaths since the last revival (drives backoff)
//! - Notify the owning pool of every effective status change
//! - Run health probes and requests through the transport
//!
//! # State Transitions
//! ```text
//! Alive → Dead, Dead → Alive
//! Alive → Closed, Dead → Closed   (Closed is terminal)
//! Dead → Dead                     (re-death: still notified, death count grows)
//! ```
//!
//! # Design Decisions
//! - At most one listener; the pool attaches it on insert and detaches it on removal
//! - The listener runs after the connection's own lock is released
//! - Any other same-status write is silent

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;

use crate::net::host::Host;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Default bound on a single health probe.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Unique identifier for a connection instance.
///
/// Two connections to the same host created at different times get different IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Eligible for selection.
    Alive,
    /// Failed recently; waiting out its backoff.
    Dead,
    /// Removed from its pool. Terminal.
    Closed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Alive => "alive",
            Status::Dead => "dead",
            Status::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// An effective status change, as delivered to the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub previous: Status,
    pub current: Status,
    /// Deaths since the last revival, including this one.
    pub deaths: u32,
}

impl StatusChange {
    /// A dead connection was declared dead again.
    pub fn is_redeath(&self) -> bool {
        self.previous == Status::Dead && self.current == Status::Dead
    }
}

/// Callback invoked on every effective status change.
pub type StatusListener = Arc<dyn Fn(&StatusChange) + Send + Sync>;

struct ConnectionState {
    status: Status,
    deaths: u32,
    listener: Option<StatusListener>,
}

/// A pool-managed connection to one node.
pub struct Connection {
    id: ConnectionId,
    host: Host,
    transport: Arc<dyn Transport>,
    ping_timeout: Duration,
    state: Mutex<ConnectionState>,
}

impl Connection {
    /// Create a new, alive connection.
    pub fn new(host: Host, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: ConnectionId::new(),
            host,
            transport,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            state: Mutex::new(ConnectionState {
                status: Status::Alive,
                deaths: 0,
                listener: None,
            }),
        }
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Registry key of this connection.
    pub fn key(&self) -> String {
        self.host.key()
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    /// Deaths since the connection was created or last revived.
    pub fn deaths(&self) -> u32 {
        self.lock().deaths
    }

    /// Number of attached status listeners (0 or 1).
    pub fn listener_count(&self) -> usize {
        usize::from(self.lock().listener.is_some())
    }

    /// Move to `next` and notify the listener.
    ///
    /// Writes to a closed connection are ignored. Writing the current status is
    /// silent, except `Dead` over `Dead`, which counts as a fresh death.
    pub fn set_status(&self, next: Status) {
        let (listener, change) = {
            let mut state = self.lock();
            let previous = state.status;

            if previous == Status::Closed {
                return;
            }
            if previous == next && next != Status::Dead {
                return;
            }

            state.status = next;
            match next {
                Status::Dead => state.deaths = state.deaths.saturating_add(1),
                Status::Alive => state.deaths = 0,
                Status::Closed => {}
            }

            let listener = if next == Status::Closed {
                state.listener.take()
            } else {
                state.listener.clone()
            };
            let change = StatusChange {
                previous,
                current: next,
                deaths: state.deaths,
            };
            (listener, change)
        };

        tracing::trace!(
            connection_id = %self.id,
            host = %self.host,
            from = %change.previous,
            to = %change.current,
            "Connection status set"
        );

        if let Some(listener) = listener {
            listener(&change);
        }
    }

    /// Close the connection. Equivalent to `set_status(Status::Closed)`.
    pub fn close(&self) {
        self.set_status(Status::Closed);
    }

    /// Probe the node, bounded by the ping timeout.
    pub async fn ping(&self) -> Result<(), TransportError> {
        match timeout(self.ping_timeout, self.transport.ping(&self.host)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                host: self.host.key(),
                timeout_ms: self.ping_timeout.as_millis() as u64,
            }),
        }
    }

    /// Send a request. A transport failure marks this connection dead.
    pub async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let result = self.transport.request(&self.host, request).await;
        if let Err(e) = &result {
            tracing::warn!(host = %self.host, error = %e, "Request failed, marking connection dead");
            self.set_status(Status::Dead);
        }
        result
    }

    pub(crate) fn attach_listener(&self, listener: StatusListener) {
        self.lock().listener = Some(listener);
    }

    pub(crate) fn detach_listener(&self) {
        self.lock().listener = None;
    }

    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("host", &self.host.key())
            .field("status", &state.status)
            .field("deaths", &state.deaths)
            .finish()
    }
}
