// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod operation;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobState, LocalHandle, ResourceLocator};
pub use operation::Operation;
pub use queue::{QueueId, QueuePool, DISTRIBUTION_QUEUE, QUEUE_PREFIX};
