//! Shared utilities for pool integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use node_pool::net::Host;
use node_pool::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use node_pool::{Connection, Pool};

/// In-memory transport whose nodes are up or down on command.
///
/// Records the order of pings and the highest number of pings in flight at once.
#[derive(Default)]
pub struct ScriptedTransport {
    down: Mutex<HashMap<String, bool>>,
    pings: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every ping takes `latency` before it answers.
    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::default()
        })
    }

    pub fn set_down(&self, host: &Host, down: bool) {
        self.down.lock().unwrap().insert(host.key(), down);
    }

    pub fn pings(&self) -> Vec<String> {
        self.pings.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn is_down(&self, host: &Host) -> bool {
        self.down
            .lock()
            .unwrap()
            .get(&host.key())
            .copied()
            .unwrap_or(false)
    }
}

impl Transport for ScriptedTransport {
    fn ping<'a>(&'a self, host: &'a Host) -> BoxFuture<'a, Result<(), TransportError>> {
        async move {
            self.pings.lock().unwrap().push(host.key());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            // Give any concurrent probe a chance to start.
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.is_down(host) {
                Err(TransportError::Connect {
                    host: host.key(),
                    reason: "keep trying".into(),
                })
            } else {
                Ok(())
            }
        }
        .boxed()
    }

    fn request<'a>(
        &'a self,
        host: &'a Host,
        _request: TransportRequest,
    ) -> BoxFuture<'a, Result<TransportResponse, TransportError>> {
        async move {
            if self.is_down(host) {
                Err(TransportError::Connect {
                    host: host.key(),
                    reason: "down".into(),
                })
            } else {
                Ok(TransportResponse {
                    status: 200,
                    body: Vec::new(),
                })
            }
        }
        .boxed()
    }
}

pub fn host(port: u16) -> Host {
    format!("localhost:{}", port).parse().unwrap()
}

pub fn connection(port: u16, transport: &Arc<ScriptedTransport>) -> Arc<Connection> {
    Arc::new(Connection::new(host(port), transport.clone()))
}

/// `alive ∪ dead` covers the registry exactly, with no identity twice.
pub fn assert_partition(pool: &Pool) {
    let alive = pool.get_connections();
    let dead = pool.dead_connections();
    assert_eq!(alive.len() + dead.len(), pool.len());

    let mut keys: Vec<String> = alive.iter().chain(dead.iter()).map(|c| c.key()).collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), pool.len());
}
