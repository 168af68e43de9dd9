//! Uniform random selection strategy.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::net::connection::Connection;
use crate::selector::{Selection, Strategy};

#[derive(Debug, Default, Clone, Copy)]
pub struct Random;

impl Strategy for Random {
    fn pick(&self, candidates: &[Arc<Connection>]) -> Selection {
        candidates.choose(&mut rand::thread_rng()).cloned()
    }
}
