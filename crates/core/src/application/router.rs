//! Router - the in-process stand-in for the orchestration engine's task routing
//!
//! One bounded channel per queue. A routed call carries a named operation to
//! whichever worker listens on the target queue and waits for its reply.

use crate::domain::{JobId, LocalHandle, Operation, QueueId, ResourceLocator};
use crate::error::{AppError, Result};
use crate::port::StepError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Operation payload routed to a worker
#[derive(Debug, Clone)]
pub enum Request {
    SelectQueue,
    Acquire(ResourceLocator),
    Process(LocalHandle),
    Release(LocalHandle),
}

impl Request {
    pub fn operation(&self) -> Operation {
        match self {
            Request::SelectQueue => Operation::SelectQueue,
            Request::Acquire(_) => Operation::Acquire,
            Request::Process(_) => Operation::Process,
            Request::Release(_) => Operation::Release,
        }
    }
}

/// Operation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Queue(QueueId),
    Staged(LocalHandle),
    Released,
}

/// Worker reply, stamped with the queue the operation actually ran on
#[derive(Debug)]
pub struct Reply {
    pub executed_on: QueueId,
    pub result: Result<Output>,
}

/// A routed unit of work waiting in a queue
#[derive(Debug)]
pub struct Task {
    pub job_id: JobId,
    pub request: Request,
    pub reply: oneshot::Sender<Reply>,
}

/// Routing table from queue identifier to the bound worker's inbox
#[derive(Clone)]
pub struct Router {
    routes: Arc<HashMap<QueueId, mpsc::Sender<Task>>>,
}

impl Router {
    pub fn new(routes: HashMap<QueueId, mpsc::Sender<Task>>) -> Self {
        Self {
            routes: Arc::new(routes),
        }
    }

    /// Route `request` to `queue` and wait up to `timeout` for the reply.
    ///
    /// The reply carries the queue the operation executed on and the
    /// operation's own result, which may itself be an error.
    ///
    /// # Errors
    /// - AppError::QueueClosed if no worker is bound to `queue` or it stopped
    /// - AppError::Step(TimedOut) if no reply arrives in time
    pub async fn call(
        &self,
        queue: &QueueId,
        job_id: &str,
        request: Request,
        timeout: Duration,
    ) -> Result<Reply> {
        let operation = request.operation();
        let inbox = self
            .routes
            .get(queue)
            .ok_or_else(|| AppError::QueueClosed(format!("no worker bound to {}", queue)))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let task = Task {
            job_id: job_id.to_string(),
            request,
            reply: reply_tx,
        };
        inbox
            .send(task)
            .await
            .map_err(|_| AppError::QueueClosed(queue.to_string()))?;
        debug!(queue = %queue, job_id = %job_id, operation = %operation, "Routed task");

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AppError::QueueClosed(format!(
                "{} dropped {} for job {}",
                queue, operation, job_id
            ))),
            Err(_) => Err(StepError::TimedOut {
                operation,
                after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into()),
        }
    }
}
