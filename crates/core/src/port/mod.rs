// Port Layer - Interfaces for external dependencies

pub mod backend;
pub mod id_provider;
pub mod resource_stager;
pub mod time_provider;

// Re-exports
pub use backend::{BackendConnection, BackendConnector};
pub use id_provider::IdProvider;
pub use resource_stager::{ResourceStager, StagerFactory, StepError};
pub use time_provider::TimeProvider;
