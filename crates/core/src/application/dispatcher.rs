//! Dispatcher - picks the sticky queue a new job is pinned to
//!
//! The dispatcher only chooses affinity; the router and job runner enforce it.

use crate::domain::{QueueId, QueuePool};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Random source shared by pool generation and random selection.
///
/// `Some(seed)` gives reproducible runs (test mode); `None` seeds from entropy.
pub fn random_source(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Queue selection policy
pub trait QueueSelector: Send + Sync {
    /// Pick one queue from a non-empty pool
    fn select(&self, pool: &QueuePool) -> QueueId;

    /// Policy name, for logs
    fn name(&self) -> &'static str;
}

/// Uniform random selection
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl RandomSelector {
    pub fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }
}

impl QueueSelector for RandomSelector {
    fn select(&self, pool: &QueuePool) -> QueueId {
        let index = {
            let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            rng.gen_range(0..pool.len())
        };
        pool.at(index).clone()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Cycles through the pool in order
#[derive(Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl QueueSelector for RoundRobinSelector {
    fn select(&self, pool: &QueuePool) -> QueueId {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        pool.at(index).clone()
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Dispatcher over a fixed pool
pub struct Dispatcher {
    pool: Arc<QueuePool>,
    selector: Box<dyn QueueSelector>,
}

impl Dispatcher {
    pub fn new(pool: Arc<QueuePool>, selector: Box<dyn QueueSelector>) -> Self {
        Self { pool, selector }
    }

    /// Pick the queue a new job is pinned to. Called once per job.
    pub fn select_queue(&self) -> QueueId {
        let queue = self.selector.select(&self.pool);
        debug!(queue = %queue, policy = self.selector.name(), "Selected sticky queue");
        queue
    }

    pub fn pool(&self) -> &Arc<QueuePool> {
        &self.pool
    }
}
