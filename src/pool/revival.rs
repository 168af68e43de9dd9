//! Dead-connection revival.
//!
//! # Responsibilities
//! - Arm one timer per dead connection at its backoff deadline
//! - Probe a connection when its timer fires
//! - Run the sequential oldest-first race when nothing is alive
//!
//! # Design Decisions
//! - At most one probe per identity at a time; a probe claims the identity in
//!   `PoolState::probing` and releases it when done
//! - While a race runs, expired timers are re-armed instead of probing, so the
//!   race is the only prober and each failed attempt counts as one death
//! - A race reaching a candidate that a timer is already probing waits for
//!   that probe and uses its outcome
//! - A connection closed mid-probe is treated as gone

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::net::connection::{Connection, Status};
use crate::observability::metrics;
use crate::pool::state::PoolState;
use crate::pool::types::{PoolError, SelectResult};
use crate::pool::{Pool, Shared};

/// Claim on one identity in `PoolState::probing`. Released on drop.
struct ProbeClaim<'a> {
    shared: &'a Shared,
    key: String,
}

impl Drop for ProbeClaim<'_> {
    fn drop(&mut self) {
        self.shared.lock().probing.remove(&self.key);
        self.shared.probe_done.notify_waiters();
    }
}

/// Marks a revival race as running. Released on drop, including when the
/// selection future is dropped mid-race.
struct RaceGuard<'a> {
    shared: &'a Shared,
}

impl<'a> RaceGuard<'a> {
    fn enter(shared: &'a Shared) -> Self {
        shared.lock().races += 1;
        Self { shared }
    }
}

impl Drop for RaceGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.races = state.races.saturating_sub(1);
    }
}

impl Pool {
    /// Record a death of `conn`: compute its backoff, reposition it in the dead
    /// list and replace its timer.
    pub(crate) fn schedule_revival(&self, state: &mut PoolState, key: &str, conn: &Arc<Connection>, deaths: u32) {
        let delay_ms = self.arm_revival(state, key, conn, deaths);
        tracing::warn!(
            host = %key,
            deaths,
            retry_in_ms = delay_ms,
            "Connection marked dead"
        );
    }

    /// Replace the timer of `conn` with one at the backoff for `deaths`.
    /// Returns the delay in milliseconds.
    fn arm_revival(&self, state: &mut PoolState, key: &str, conn: &Arc<Connection>, deaths: u32) -> u64 {
        // The first death waits exactly the base timeout.
        let delay_ms = self
            .shared
            .dead_timeout
            .calc(deaths.saturating_sub(1), self.shared.dead_timeout_ms);
        let deadline = Instant::now() + Duration::from_millis(delay_ms);
        let timer_id = state.mark_dead(key, conn, deadline);

        let Some(runtime) = self.runtime() else {
            tracing::warn!(host = %key, "No async runtime, revival timer not armed");
            return delay_ms;
        };

        let weak = Arc::downgrade(&self.shared);
        let timer_key = key.to_string();
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(shared) = weak.upgrade() {
                Pool { shared }.on_revival_timer(&timer_key, timer_id).await;
            }
        });
        state.arm_timer(key, timer_id, task.abort_handle());
        delay_ms
    }

    async fn on_revival_timer(&self, key: &str, timer_id: u64) {
        let conn = {
            let mut state = self.shared.lock();
            match state.timers.get_mut(key) {
                Some(timer) if timer.id == timer_id => timer.handle = None,
                _ => return,
            }
            let Some(conn) = state.index.get(key).cloned() else {
                return;
            };
            if conn.status() != Status::Dead {
                return;
            }
            if state.races > 0 || state.probing.contains(key) {
                let delay_ms = self.arm_revival(&mut state, key, &conn, conn.deaths());
                tracing::debug!(host = %key, retry_in_ms = delay_ms, "Probe already running, revival timer deferred");
                return;
            }
            state.probing.insert(key.to_string());
            conn
        };

        let _claim = ProbeClaim {
            shared: &self.shared,
            key: key.to_string(),
        };
        tracing::debug!(host = %key, "Revival timer fired, probing");
        self.probe(&conn).await;
    }

    /// Wait until no other probe holds `key`, then take it.
    async fn claim_probe(&self, key: &str) -> ProbeClaim<'_> {
        loop {
            let released = {
                let mut state = self.shared.lock();
                if state.probing.insert(key.to_string()) {
                    return ProbeClaim {
                        shared: &self.shared,
                        key: key.to_string(),
                    };
                }
                // Registered before the lock is released, so a release in
                // between is not missed.
                self.shared.probe_done.notified()
            };
            released.await;
        }
    }

    /// Probe `conn` and record the outcome on it. Returns true if it is alive afterwards.
    pub(crate) async fn probe(&self, conn: &Arc<Connection>) -> bool {
        match conn.ping().await {
            Ok(()) => {
                metrics::record_revival_probe(true);
                conn.set_status(Status::Alive);
                conn.status() == Status::Alive
            }
            Err(e) => {
                metrics::record_revival_probe(false);
                tracing::warn!(host = %conn.host(), error = %e, "Probe failed");
                conn.set_status(Status::Dead);
                false
            }
        }
    }

    /// Probe `candidates` one at a time, in order, and return the first that answers.
    pub(crate) async fn revive_oldest(&self, candidates: Vec<Arc<Connection>>) -> SelectResult {
        let _race = RaceGuard::enter(&self.shared);
        let tried = candidates.len();
        tracing::debug!(candidates = tried, "No living connections, probing dead ones");

        for conn in candidates {
            let _claim = self.claim_probe(&conn.key()).await;
            match conn.status() {
                Status::Closed => continue,
                // Revived by its own timer while the race waited for it.
                Status::Alive => return Ok(Some(conn)),
                Status::Dead => {}
            }
            if self.probe(&conn).await {
                tracing::info!(host = %conn.host(), "Dead connection revived");
                return Ok(Some(conn));
            }
        }

        tracing::warn!(tried, "All dead connections failed their probe");
        Err(PoolError::NoLivingConnections { tried })
    }
}
