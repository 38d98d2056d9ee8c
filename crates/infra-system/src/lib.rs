// Sticky Infrastructure - System Adapters
// Implements: ResourceStager, BackendConnector

pub mod file_stager;
pub mod tcp_backend;

pub use file_stager::{FileStager, FileStagerFactory};
pub use tcp_backend::TcpBackendConnector;
