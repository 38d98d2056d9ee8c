//! Pinned worker pool - startup, readiness and aggregate completion
//!
//! One base worker on the distribution queue plus exactly one pinned worker
//! per queue in the pool. Workers exit once every router clone is dropped,
//! which happens after the last in-flight job runner finishes.

use crate::application::dispatcher::Dispatcher;
use crate::application::router::{Router, Task};
use crate::application::worker::constants::{
    BASE_REGISTRATIONS, DEFAULT_MAX_CONCURRENT_STEPS, DEFAULT_POOL_SIZE, DEFAULT_STEP_TIMEOUT,
    PINNED_REGISTRATIONS, TASK_CHANNEL_CAPACITY,
};
use crate::application::worker::{Registration, ShutdownToken, Worker};
use crate::domain::{Operation, QueueId};
use crate::error::{AppError, Result};
use crate::port::StagerFactory;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of sticky queues / pinned workers
    pub size: usize,
    /// Fixed seed for reproducible runs; `None` in production
    pub seed: Option<u64>,
    pub max_concurrent_steps: usize,
    pub step_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_POOL_SIZE,
            seed: None,
            max_concurrent_steps: DEFAULT_MAX_CONCURRENT_STEPS,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

/// A queue and the worker listening on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerBinding {
    pub queue: QueueId,
    pub operations: Vec<Operation>,
}

/// Running pool of workers
pub struct WorkerPool {
    router: Router,
    base: WorkerBinding,
    pinned: Vec<WorkerBinding>,
    handles: Vec<(QueueId, JoinHandle<Result<()>>)>,
}

impl WorkerPool {
    /// Start the base worker and one pinned worker per pool queue.
    ///
    /// Resolves once every worker reported it is listening.
    pub async fn start(
        dispatcher: Arc<Dispatcher>,
        stagers: &dyn StagerFactory,
        config: &PoolConfig,
        shutdown: ShutdownToken,
    ) -> Result<Self> {
        let pool = Arc::clone(dispatcher.pool());
        let mut routes = HashMap::with_capacity(pool.len() + 1);
        let mut handles = Vec::with_capacity(pool.len() + 1);
        let mut readiness = Vec::with_capacity(pool.len() + 1);

        let base = Self::spawn_worker(
            QueueId::distribution(),
            Registration::Dispatcher(dispatcher),
            &BASE_REGISTRATIONS,
            config,
            &shutdown,
            &mut routes,
            &mut handles,
            &mut readiness,
        )?;

        let mut pinned = Vec::with_capacity(pool.len());
        for queue in pool.iter() {
            let registration = Registration::Steps(stagers.stager_for(queue));
            pinned.push(Self::spawn_worker(
                queue.clone(),
                registration,
                &PINNED_REGISTRATIONS,
                config,
                &shutdown,
                &mut routes,
                &mut handles,
                &mut readiness,
            )?);
        }

        for (queue, ready) in readiness {
            ready.await.map_err(|_| {
                AppError::Internal(format!("worker {} exited before it was ready", queue))
            })?;
            if queue == base.queue {
                info!(queue = %queue, "Base worker started");
            } else {
                info!(queue = %queue, "Worker {} started", queue);
            }
        }
        info!(workers = pinned.len(), "All workers started");

        Ok(Self {
            router: Router::new(routes),
            base,
            pinned,
            handles,
        })
    }

    fn spawn_worker(
        queue: QueueId,
        registration: Registration,
        names: &[&str],
        config: &PoolConfig,
        shutdown: &ShutdownToken,
        routes: &mut HashMap<QueueId, mpsc::Sender<Task>>,
        handles: &mut Vec<(QueueId, JoinHandle<Result<()>>)>,
        readiness: &mut Vec<(QueueId, oneshot::Receiver<QueueId>)>,
    ) -> Result<WorkerBinding> {
        if routes.contains_key(&queue) {
            return Err(AppError::Config(format!(
                "queue {} already has a worker bound",
                queue
            )));
        }

        let operations = registration.resolve(names)?;
        let (tx, rx) = mpsc::channel(TASK_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let binding = WorkerBinding {
            queue: queue.clone(),
            operations: operations.clone(),
        };

        let worker = Worker::new(
            queue.clone(),
            registration,
            operations,
            rx,
            config.max_concurrent_steps,
        );
        let handle = tokio::spawn(worker.run(shutdown.clone(), ready_tx));

        routes.insert(queue.clone(), tx);
        handles.push((queue.clone(), handle));
        readiness.push((queue, ready_rx));
        Ok(binding)
    }

    /// Router for submitting work to this pool
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Worker on the distribution queue
    pub fn base_binding(&self) -> &WorkerBinding {
        &self.base
    }

    /// One binding per sticky queue, in pool order
    pub fn pinned_bindings(&self) -> &[WorkerBinding] {
        &self.pinned
    }

    /// Aggregate completion: resolves once every worker's run loop exited.
    ///
    /// Drops the pool's own router first; workers then exit as soon as the
    /// remaining router clones (engine, in-flight job runners) are gone.
    pub async fn wait(self) -> Result<()> {
        let Self {
            router, handles, ..
        } = self;
        drop(router);

        let (queues, joins): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let mut first_error = None;
        for (queue, joined) in queues.into_iter().zip(join_all(joins).await) {
            let outcome = joined
                .map_err(|e| AppError::Internal(format!("worker {} panicked: {}", queue, e)))
                .and_then(|run| run);
            if let Err(e) = outcome {
                error!(queue = %queue, error = %e, "Worker exited with error");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        info!("All workers stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
