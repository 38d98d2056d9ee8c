// Backend connector implementation
// reason: tokio::net for the startup handshake against the orchestration backend
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

use sticky_core::port::{BackendConnection, BackendConnector};
use sticky_core::{AppError, Result};

/// Opens a TCP connection to `host:port` and reports the peer
pub struct TcpBackendConnector {
    connect_timeout: Duration,
}

impl TcpBackendConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl BackendConnector for TcpBackendConnector {
    async fn connect(&self, endpoint: &str) -> Result<BackendConnection> {
        if endpoint.rsplit_once(':').map_or(true, |(host, port)| {
            host.is_empty() || port.parse::<u16>().is_err()
        }) {
            return Err(AppError::Connection(format!(
                "invalid endpoint {:?}: expected host:port",
                endpoint
            )));
        }

        let stream = match timeout(self.connect_timeout, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(AppError::Connection(format!("{}: {}", endpoint, e))),
            Err(_) => {
                return Err(AppError::Connection(format!(
                    "{}: no answer within {}ms",
                    endpoint,
                    self.connect_timeout.as_millis()
                )))
            }
        };

        let peer = stream.peer_addr().ok();
        info!(endpoint = %endpoint, peer = ?peer, "Connected to orchestration backend");
        Ok(BackendConnection {
            endpoint: endpoint.to_string(),
            peer,
        })
    }
}
