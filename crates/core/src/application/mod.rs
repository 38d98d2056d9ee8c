// Application Layer - Use Cases and Worker Pool

pub mod dispatcher;
pub mod engine;
pub mod pool;
pub mod router;
pub mod worker;
pub mod workflow;

// Re-exports
pub use dispatcher::{random_source, Dispatcher, QueueSelector, RandomSelector, RoundRobinSelector};
pub use engine::{JobTicket, StickyEngine};
pub use pool::{PoolConfig, WorkerBinding, WorkerPool};
pub use router::Router;
pub use worker::{shutdown_channel, Registration, ShutdownSender, ShutdownToken, Worker};
pub use workflow::{JobReport, JobRunner, StepRecord};
