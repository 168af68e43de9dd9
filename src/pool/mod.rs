//! Connection pool.
//!
//! # Data Flow
//! ```text
//! set_hosts(desired)
//!     → diff against the registry (keep / add / remove)
//!     → state.rs (index + alive + dead + timers, one lock)
//!
//! Connection::set_status
//!     → listener attached by the pool
//!     → on_status_change: move between alive/dead, (re)arm timer
//!
//! select
//!     → alive non-empty: Selector (sync result handed over later, async awaited)
//!     → alive empty: revival.rs (sequential probes, oldest deadline first)
//! ```
//!
//! # Design Decisions
//! - The registry holds exactly one connection per identity; the first one wins
//! - Removal always closes the connection
//! - No status write or listener call ever happens while the pool lock is held
//! - All failures reach callers through `select`; bookkeeping no-ops are not errors

mod revival;
mod state;
pub mod types;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::{ConfigError, PoolConfig};
use crate::net::connection::{Connection, ConnectionId, Status, StatusChange, StatusListener};
use crate::net::host::Host;
use crate::observability::metrics;
use crate::resilience::backoff::DeadTimeout;
use crate::selector::Selector;
use crate::transport::{HttpTransport, Transport};

use state::PoolState;
pub use types::{DeadConnection, PoolError, PoolSnapshot, SelectResult};

/// Default base dead timeout.
pub const DEFAULT_DEAD_TIMEOUT_MS: u64 = 60_000;

pub(crate) struct Shared {
    state: Mutex<PoolState>,
    selector: Selector,
    dead_timeout: DeadTimeout,
    dead_timeout_ms: u64,
    ping_timeout: Duration,
    transport: Arc<dyn Transport>,
    runtime: Option<Handle>,
    /// Signalled whenever an identity leaves `PoolState::probing`.
    probe_done: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.cancel_all_timers();
        for conn in state.index.values() {
            conn.detach_listener();
        }
    }
}

/// Handle to a connection pool. Clones share the same pool.
#[derive(Clone)]
pub struct Pool {
    shared: Arc<Shared>,
}

impl Pool {
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// A pool with default settings on the given transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        PoolBuilder::new().build_with(transport)
    }

    // --- Registry ---

    /// Register `conn` unless its identity is already registered.
    ///
    /// Returns true if it was inserted. Closed connections are never inserted.
    pub fn add_connection(&self, conn: Arc<Connection>) -> bool {
        let key = conn.key();
        let mut state = self.shared.lock();
        if state.index.contains_key(&key) {
            return false;
        }

        state.index.insert(key.clone(), conn.clone());
        conn.attach_listener(self.listener_for(&conn));

        // Read status only after the listener is attached so a concurrent
        // change is either seen here or replayed by the listener.
        match conn.status() {
            Status::Alive => state.alive.push(conn.clone()),
            Status::Dead => self.schedule_revival(&mut state, &key, &conn, conn.deaths().max(1)),
            Status::Closed => {
                state.index.remove(&key);
                conn.detach_listener();
                return false;
            }
        }

        tracing::debug!(host = %key, connection_id = %conn.id(), "Connection added");
        metrics::record_pool_sizes(state.alive.len(), state.dead.len());
        true
    }

    /// Unregister and close `conn`. A connection that is not the registered
    /// instance for its identity is left untouched.
    pub fn remove_connection(&self, conn: &Arc<Connection>) -> bool {
        let key = conn.key();
        {
            let mut state = self.shared.lock();
            if !state.registered(&key, conn) {
                return false;
            }
            state.remove(&key);
            conn.detach_listener();
            metrics::record_pool_sizes(state.alive.len(), state.dead.len());
        }

        conn.close();
        tracing::debug!(host = %key, connection_id = %conn.id(), "Connection removed");
        true
    }

    /// Reconcile the registry with `hosts`.
    ///
    /// Known identities keep their connection untouched, new ones get a fresh
    /// alive connection, and registered identities missing from `hosts` are removed.
    pub fn set_hosts<I>(&self, hosts: I)
    where
        I: IntoIterator<Item = Host>,
    {
        let mut wanted = HashSet::new();
        let mut desired = Vec::new();
        for host in hosts {
            if wanted.insert(host.key()) {
                desired.push(host);
            }
        }

        let stale: Vec<Arc<Connection>> = {
            let state = self.shared.lock();
            state
                .index
                .iter()
                .filter(|(key, _)| !wanted.contains(*key))
                .map(|(_, conn)| conn.clone())
                .collect()
        };

        let mut removed = 0;
        for conn in &stale {
            if self.remove_connection(conn) {
                removed += 1;
            }
        }

        let mut added = 0;
        for host in desired {
            if self.connection(&host).is_none() && self.add_connection(Arc::new(self.new_connection(host))) {
                added += 1;
            }
        }

        tracing::info!(added, removed, total = self.len(), "Hosts synchronized");
    }

    /// Remove and close every connection. Idempotent.
    pub fn close(&self) {
        let all: Vec<Arc<Connection>> = {
            let state = self.shared.lock();
            state.index.values().cloned().collect()
        };
        for conn in &all {
            self.remove_connection(conn);
        }
        if !all.is_empty() {
            tracing::info!(closed = all.len(), "Connection pool closed");
        }
    }

    // --- Selection ---

    /// Select a connection for the next request.
    pub async fn select(&self) -> SelectResult {
        let result = self.begin_select().await;
        record_selection(&result);
        result
    }

    /// Select a connection and hand the result to `callback`.
    ///
    /// The callback always runs on a spawned task, never before this returns,
    /// even when the selector is synchronous.
    pub fn select_with<F>(&self, callback: F)
    where
        F: FnOnce(SelectResult) + Send + 'static,
    {
        let Some(runtime) = self.runtime() else {
            tracing::error!("select_with called outside of an async runtime");
            std::thread::spawn(move || callback(Err(PoolError::NoRuntime)));
            return;
        };

        let pending = self.begin_select();
        runtime.spawn(async move {
            let result = pending.await;
            record_selection(&result);
            callback(result);
        });
    }

    fn begin_select(&self) -> BoxFuture<'static, SelectResult> {
        let (alive, dead) = {
            let state = self.shared.lock();
            (state.alive.clone(), state.dead.clone())
        };

        if alive.is_empty() {
            let pool = self.clone();
            return async move { pool.revive_oldest(dead).await }.boxed();
        }

        self.shared
            .selector
            .invoke(alive)
            .map(|result| result.map_err(PoolError::from))
            .boxed()
    }

    // --- Inspection ---

    /// Snapshot of the alive connections.
    pub fn get_connections(&self) -> Vec<Arc<Connection>> {
        self.shared.lock().alive.clone()
    }

    /// Snapshot of the dead connections, soonest revival first.
    pub fn dead_connections(&self) -> Vec<Arc<Connection>> {
        self.shared.lock().dead.clone()
    }

    /// The registered connection for `host`'s identity.
    pub fn connection(&self, host: &Host) -> Option<Arc<Connection>> {
        self.shared.lock().index.get(&host.key()).cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of armed revival timers.
    pub fn pending_revivals(&self) -> usize {
        self.shared.lock().pending_timers()
    }

    pub fn revival_deadline(&self, conn: &Connection) -> Option<Instant> {
        self.shared.lock().timers.get(&conn.key()).map(|t| t.deadline)
    }

    /// Identifier of the current revival timer; changes every time it is replaced.
    pub fn revival_timer_id(&self, conn: &Connection) -> Option<u64> {
        self.shared.lock().timers.get(&conn.key()).map(|t| t.id)
    }

    /// Backoff in milliseconds for `deaths` prior deaths and base `base_ms`.
    pub fn calc_dead_timeout(&self, deaths: u32, base_ms: u64) -> u64 {
        self.shared.dead_timeout.calc(deaths, base_ms)
    }

    pub fn dead_timeout_policy(&self) -> &DeadTimeout {
        &self.shared.dead_timeout
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.shared.lock();
        let now = Instant::now();
        PoolSnapshot {
            alive: state.alive.iter().map(|c| c.key()).collect(),
            dead: state
                .dead
                .iter()
                .map(|c| {
                    let key = c.key();
                    let retry_in_ms = state
                        .timers
                        .get(&key)
                        .map(|t| t.deadline.saturating_duration_since(now).as_millis() as u64)
                        .unwrap_or(0);
                    DeadConnection {
                        host: key,
                        deaths: c.deaths(),
                        retry_in_ms,
                    }
                })
                .collect(),
        }
    }

    // --- Internals ---

    fn new_connection(&self, host: Host) -> Connection {
        Connection::new(host, self.shared.transport.clone()).with_ping_timeout(self.shared.ping_timeout)
    }

    fn runtime(&self) -> Option<Handle> {
        self.shared
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
    }

    fn listener_for(&self, conn: &Arc<Connection>) -> StatusListener {
        let weak = Arc::downgrade(&self.shared);
        let key = conn.key();
        let id = conn.id();
        Arc::new(move |change: &StatusChange| {
            if let Some(shared) = weak.upgrade() {
                Pool { shared }.on_status_change(&key, id, change);
            }
        })
    }

    fn on_status_change(&self, key: &str, id: ConnectionId, change: &StatusChange) {
        let mut state = self.shared.lock();
        let conn = match state.index.get(key) {
            Some(conn) if conn.id() == id => conn.clone(),
            _ => return,
        };

        match change.current {
            Status::Dead => {
                // A later write already superseded this one.
                if conn.status() != Status::Dead {
                    return;
                }
                metrics::record_death();
                self.schedule_revival(&mut state, key, &conn, change.deaths);
            }
            Status::Alive => {
                if conn.status() != Status::Alive {
                    return;
                }
                if state.mark_alive(key, &conn) {
                    tracing::info!(host = %key, "Connection alive again");
                }
            }
            Status::Closed => {
                state.remove(key);
                tracing::debug!(host = %key, "Registered connection closed externally");
            }
        }

        metrics::record_pool_sizes(state.alive.len(), state.dead.len());
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Pool")
            .field("alive", &state.alive.len())
            .field("dead", &state.dead.len())
            .field("selector", &self.shared.selector)
            .field("dead_timeout", &self.shared.dead_timeout)
            .finish()
    }
}

fn record_selection(result: &SelectResult) {
    let outcome = match result {
        Ok(Some(_)) => "selected",
        Ok(None) => "empty",
        Err(_) => "error",
    };
    metrics::record_selection(outcome);
}

/// Builder for [`Pool`].
pub struct PoolBuilder {
    hosts: Vec<Host>,
    selector: Selector,
    dead_timeout: DeadTimeout,
    dead_timeout_ms: u64,
    ping_timeout: Duration,
    transport: Option<Arc<dyn Transport>>,
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            hosts: Vec::new(),
            selector: Selector::default(),
            dead_timeout: DeadTimeout::default(),
            dead_timeout_ms: DEFAULT_DEAD_TIMEOUT_MS,
            ping_timeout: crate::net::connection::DEFAULT_PING_TIMEOUT,
            transport: None,
        }
    }

    /// Resolve every named option in `config`. Unknown names fail here.
    pub fn from_config(config: &PoolConfig) -> Result<Self, ConfigError> {
        let dead_timeout = DeadTimeout::from_name(&config.calc_dead_timeout, config.max_dead_timeout_ms)?;
        let selector = Selector::from_name(&config.selector)?;
        let hosts = config.resolve_hosts()?;

        Ok(Self {
            hosts,
            selector,
            dead_timeout,
            dead_timeout_ms: config.dead_timeout_ms,
            ping_timeout: Duration::from_millis(config.ping_timeout_ms),
            transport: None,
        })
    }

    pub fn hosts<I: IntoIterator<Item = Host>>(mut self, hosts: I) -> Self {
        self.hosts = hosts.into_iter().collect();
        self
    }

    pub fn selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn dead_timeout(mut self, policy: DeadTimeout) -> Self {
        self.dead_timeout = policy;
        self
    }

    /// Base timeout fed to the backoff policy.
    pub fn dead_timeout_ms(mut self, ms: u64) -> Self {
        self.dead_timeout_ms = ms;
        self
    }

    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the pool, falling back to [`HttpTransport`] when no transport was set.
    pub fn build(mut self) -> Result<Pool, ConfigError> {
        let transport: Arc<dyn Transport> = match self.transport.take() {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new().map_err(ConfigError::HttpClient)?),
        };
        Ok(self.build_with(transport))
    }

    fn build_with(self, transport: Arc<dyn Transport>) -> Pool {
        let pool = Pool {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState::default()),
                selector: self.selector,
                dead_timeout: self.dead_timeout,
                dead_timeout_ms: self.dead_timeout_ms,
                ping_timeout: self.ping_timeout,
                transport,
                runtime: Handle::try_current().ok(),
                probe_done: Notify::new(),
            }),
        };

        tracing::info!(
            policy = pool.shared.dead_timeout.name(),
            dead_timeout_ms = pool.shared.dead_timeout_ms,
            async_selector = pool.shared.selector.is_async(),
            "Connection pool initialized"
        );

        if !self.hosts.is_empty() {
            pool.set_hosts(self.hosts);
        }
        pool
    }
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
