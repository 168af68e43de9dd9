//! Registry and alive/dead partition.
//!
//! Everything here is plain bookkeeping under the pool's single lock: no I/O,
//! no status writes, no listener calls.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::net::connection::Connection;

/// Pending revival for one dead connection.
#[derive(Debug)]
pub(crate) struct RevivalTimer {
    pub id: u64,
    pub deadline: Instant,
    /// `None` once the timer has fired or when no runtime was available.
    pub handle: Option<AbortHandle>,
}

impl RevivalTimer {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct PoolState {
    pub index: HashMap<String, Arc<Connection>>,
    pub alive: Vec<Arc<Connection>>,
    /// Ordered by ascending revival deadline.
    pub dead: Vec<Arc<Connection>>,
    pub timers: HashMap<String, RevivalTimer>,
    /// Identities with a health probe in flight, from a timer or a race.
    pub probing: HashSet<String>,
    /// Revival races currently running. Timers do not probe while non-zero.
    pub races: usize,
    next_timer_id: u64,
}

impl PoolState {
    /// The registered connection for `key`, if it is this exact instance.
    pub fn registered(&self, key: &str, conn: &Arc<Connection>) -> bool {
        self.index
            .get(key)
            .is_some_and(|existing| Arc::ptr_eq(existing, conn))
    }

    /// Put `conn` in the dead list at the position given by `deadline`, replacing
    /// any previous timer. Returns the new timer id.
    pub fn mark_dead(&mut self, key: &str, conn: &Arc<Connection>, deadline: Instant) -> u64 {
        detach(&mut self.alive, conn);
        detach(&mut self.dead, conn);
        self.cancel_timer(key);

        self.next_timer_id += 1;
        let id = self.next_timer_id;
        self.timers.insert(
            key.to_string(),
            RevivalTimer {
                id,
                deadline,
                handle: None,
            },
        );

        let timers = &self.timers;
        let position = self.dead.partition_point(|other| {
            timers
                .get(&other.key())
                .map_or(true, |timer| timer.deadline <= deadline)
        });
        self.dead.insert(position, conn.clone());
        id
    }

    /// Attach the spawned task to timer `id`. Ignored if the timer was replaced.
    pub fn arm_timer(&mut self, key: &str, id: u64, handle: AbortHandle) {
        match self.timers.get_mut(key) {
            Some(timer) if timer.id == id => timer.handle = Some(handle),
            _ => handle.abort(),
        }
    }

    /// Move `conn` from dead to alive. Returns false if it was not dead.
    pub fn mark_alive(&mut self, key: &str, conn: &Arc<Connection>) -> bool {
        if !detach(&mut self.dead, conn) {
            return false;
        }
        self.cancel_timer(key);
        self.timers.remove(key);
        self.alive.push(conn.clone());
        true
    }

    /// Drop `key` from the registry, both lists and the timer table.
    pub fn remove(&mut self, key: &str) -> Option<Arc<Connection>> {
        let conn = self.index.remove(key)?;
        detach(&mut self.alive, &conn);
        detach(&mut self.dead, &conn);
        self.cancel_timer(key);
        self.timers.remove(key);
        Some(conn)
    }

    pub fn cancel_timer(&mut self, key: &str) {
        if let Some(timer) = self.timers.get_mut(key) {
            timer.cancel();
        }
    }

    pub fn cancel_all_timers(&mut self) {
        for timer in self.timers.values_mut() {
            timer.cancel();
        }
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.values().filter(|t| t.handle.is_some()).count()
    }
}

fn detach(list: &mut Vec<Arc<Connection>>, conn: &Arc<Connection>) -> bool {
    match list.iter().position(|c| Arc::ptr_eq(c, conn)) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}
