//! Metrics collection.
//!
//! # Metrics
//! - `node_pool_connections` (gauge, `state` = alive|dead): collection sizes
//! - `node_pool_deaths_total` (counter): transitions into dead, re-deaths included
//! - `node_pool_revival_probes_total` (counter, `outcome` = success|failure)
//! - `node_pool_selections_total` (counter, `outcome` = selected|empty|error)

use metrics::{counter, gauge};

pub fn record_pool_sizes(alive: usize, dead: usize) {
    gauge!("node_pool_connections", "state" => "alive").set(alive as f64);
    gauge!("node_pool_connections", "state" => "dead").set(dead as f64);
}

pub fn record_death() {
    counter!("node_pool_deaths_total").increment(1);
}

pub fn record_revival_probe(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("node_pool_revival_probes_total", "outcome" => outcome).increment(1);
}

pub fn record_selection(outcome: &'static str) {
    counter!("node_pool_selections_total", "outcome" => outcome).increment(1);
}
