// Orchestration Backend Port
// Only the startup handshake lives here; transport is owned by the engine side.

use crate::error::Result;
use async_trait::async_trait;
use std::net::SocketAddr;

/// An established session with the orchestration backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConnection {
    pub endpoint: String,
    pub peer: Option<SocketAddr>,
}

/// Connects to the orchestration backend at startup
///
/// # Errors
/// - `AppError::Connection` if the endpoint is unreachable. Callers treat this
///   as fatal to process startup.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<BackendConnection>;
}

pub mod mocks {
    use super::*;
    use crate::error::AppError;

    /// Connector with a fixed outcome
    pub struct MockConnector {
        reachable: bool,
    }

    impl MockConnector {
        pub fn reachable() -> Self {
            Self { reachable: true }
        }

        pub fn unreachable() -> Self {
            Self { reachable: false }
        }
    }

    #[async_trait]
    impl BackendConnector for MockConnector {
        async fn connect(&self, endpoint: &str) -> Result<BackendConnection> {
            if !self.reachable {
                return Err(AppError::Connection(format!(
                    "{}: connection refused",
                    endpoint
                )));
            }
            Ok(BackendConnection {
                endpoint: endpoint.to_string(),
                peer: None,
            })
        }
    }
}
