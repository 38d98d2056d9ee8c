// Worker Shutdown Token

use tokio::sync::watch;

/// Shutdown signal for graceful termination
///
/// Passed explicitly into every worker run loop and job runner.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    ///
    /// Returns immediately when shutdown was already requested, and also when
    /// the sender is gone.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to all workers
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_after_shutdown_returns() {
        let (tx, token) = shutdown_channel();
        tx.shutdown();

        // Token cloned after the signal must not miss it
        let mut late = token.clone();
        tokio::time::timeout(Duration::from_millis(100), late.wait())
            .await
            .expect("wait should return once shutdown was requested");
        assert!(late.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_blocks_until_signal() {
        let (tx, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());

        let pending = tokio::time::timeout(Duration::from_millis(20), token.wait()).await;
        assert!(pending.is_err());

        tx.shutdown();
        token.wait().await;
        assert!(tx.is_shutdown());
    }
}
