// Queue Domain Model

use super::error::{DomainError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Prefix shared by every queue this process listens on
pub const QUEUE_PREFIX: &str = "activity_sticky_queue";

/// Base routing queue: the dispatcher and the job runners meet here
pub const DISTRIBUTION_QUEUE: &str = "activity_sticky_queue-distribution-queue";

/// Opaque sticky queue identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Per-host queue name: `activity_sticky_queue-host-<uuid>`
    pub fn host(uuid: Uuid) -> Self {
        Self(format!("{}-host-{}", QUEUE_PREFIX, uuid))
    }

    pub fn distribution() -> Self {
        Self(DISTRIBUTION_QUEUE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed pool of sticky queues, immutable for the process lifetime.
///
/// Never empty and never holds the same identifier twice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePool {
    ids: Vec<QueueId>,
}

impl QueuePool {
    /// Generate `size` host queues from the given random source.
    ///
    /// Each identifier consumes 128 bits from `rng`, so a seeded source
    /// yields the same pool on every run.
    pub fn generate<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Result<Self> {
        let ids = (0..size)
            .map(|_| QueueId::host(Uuid::from_u128(rng.gen::<u128>())))
            .collect();
        Self::from_ids(ids)
    }

    /// Build a pool from explicit identifiers
    pub fn from_ids(ids: Vec<QueueId>) -> Result<Self> {
        if ids.is_empty() {
            return Err(DomainError::ValidationError(
                "queue pool must hold at least one queue".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if id.as_str() == DISTRIBUTION_QUEUE {
                return Err(DomainError::ValidationError(format!(
                    "{} is reserved for the dispatcher",
                    DISTRIBUTION_QUEUE
                )));
            }
            if !seen.insert(id) {
                return Err(DomainError::ValidationError(format!(
                    "duplicate queue identifier: {}",
                    id
                )));
            }
        }

        Ok(Self { ids })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Queue at `index`, wrapping around the pool size
    pub fn at(&self, index: usize) -> &QueueId {
        &self.ids[index % self.ids.len()]
    }

    pub fn contains(&self, id: &QueueId) -> bool {
        self.ids.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueId> {
        self.ids.iter()
    }
}
