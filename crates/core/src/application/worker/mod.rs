// Worker - one long-lived run loop bound to exactly one queue

pub mod constants;
mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::dispatcher::Dispatcher;
use crate::application::router::{Output, Reply, Request, Task};
use crate::domain::{Operation, QueueId};
use crate::error::{AppError, Result};
use crate::port::ResourceStager;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// What a worker serves, resolved once at startup
#[derive(Clone)]
pub enum Registration {
    /// Base worker on the distribution queue
    Dispatcher(Arc<Dispatcher>),
    /// Pinned worker: the three job steps against its own stager
    Steps(Arc<dyn ResourceStager>),
}

impl Registration {
    /// Operations this handler is able to serve
    pub fn operations(&self) -> &'static [Operation] {
        match self {
            Registration::Dispatcher(_) => &[Operation::SelectQueue],
            Registration::Steps(_) => &Operation::JOB_STEPS,
        }
    }

    pub fn supports(&self, operation: Operation) -> bool {
        self.operations().contains(&operation)
    }

    /// Resolve registration names through the operation table
    ///
    /// # Errors
    /// - AppError::Config for an unknown name or one this handler cannot serve
    pub fn resolve(&self, names: &[&str]) -> Result<Vec<Operation>> {
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let operation = Operation::from_name(name)
                .ok_or_else(|| AppError::Config(format!("unknown operation name {:?}", name)))?;
            if !self.supports(operation) {
                return Err(AppError::Config(format!(
                    "{} is not served by a {} worker",
                    name,
                    self.kind()
                )));
            }
            if !resolved.contains(&operation) {
                resolved.push(operation);
            }
        }
        Ok(resolved)
    }

    fn kind(&self) -> &'static str {
        match self {
            Registration::Dispatcher(_) => "dispatcher",
            Registration::Steps(_) => "pinned",
        }
    }
}

/// Worker processes routed tasks from its queue
pub struct Worker {
    queue: QueueId,
    registration: Registration,
    operations: Arc<[Operation]>,
    tasks: mpsc::Receiver<Task>,
    step_slots: Arc<Semaphore>,
}

impl Worker {
    pub fn new(
        queue: QueueId,
        registration: Registration,
        operations: Vec<Operation>,
        tasks: mpsc::Receiver<Task>,
        max_concurrent_steps: usize,
    ) -> Self {
        Self {
            queue,
            registration,
            operations: operations.into(),
            tasks,
            step_slots: Arc::new(Semaphore::new(max_concurrent_steps.max(1))),
        }
    }

    pub fn queue(&self) -> &QueueId {
        &self.queue
    }

    /// Run worker loop until its queue is closed
    ///
    /// Readiness is reported through `ready` once the loop is listening.
    /// Shutdown only switches the worker to draining: tasks for jobs already
    /// in flight keep arriving and are served until every sender is gone.
    pub async fn run(
        mut self,
        mut shutdown: ShutdownToken,
        ready: oneshot::Sender<QueueId>,
    ) -> Result<()> {
        let operations: Vec<&str> = self
            .operations
            .iter()
            .map(|op| op.name())
            .collect();
        info!(queue = %self.queue, operations = ?operations, "Worker listening");
        let _ = ready.send(self.queue.clone());

        let mut in_flight = JoinSet::new();
        let mut draining = false;

        loop {
            tokio::select! {
                task = self.tasks.recv() => {
                    let Some(task) = task else { break };
                    let permit = Arc::clone(&self.step_slots)
                        .acquire_owned()
                        .await
                        .map_err(|e| AppError::Internal(format!("step slots closed: {}", e)))?;
                    let queue = self.queue.clone();
                    let registration = self.registration.clone();
                    let operations = Arc::clone(&self.operations);
                    in_flight.spawn(async move {
                        let _permit = permit;
                        Self::serve(queue, registration, &operations, task).await;
                    });
                }
                _ = shutdown.wait(), if !draining => {
                    draining = true;
                    info!(queue = %self.queue, in_flight = in_flight.len(), "Worker draining");
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    Self::log_join(&self.queue, joined);
                }
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            Self::log_join(&self.queue, joined);
        }
        info!(queue = %self.queue, "Worker stopped");
        Ok(())
    }

    /// Execute one task and send the reply back to the router
    async fn serve(
        queue: QueueId,
        registration: Registration,
        operations: &[Operation],
        task: Task,
    ) {
        let Task {
            job_id,
            request,
            reply,
        } = task;
        let operation = request.operation();

        let result = if operations.contains(&operation) {
            Self::execute(&queue, &registration, &job_id, request).await
        } else {
            Err(AppError::UnregisteredOperation {
                queue: queue.to_string(),
                operation,
            })
        };
        match &result {
            Ok(_) => info!(queue = %queue, job_id = %job_id, operation = %operation, "Step completed"),
            Err(e) => warn!(queue = %queue, job_id = %job_id, operation = %operation, error = %e, "Step failed"),
        }

        let unsent = match reply.send(Reply {
            executed_on: queue.clone(),
            result,
        }) {
            Ok(()) => return,
            Err(unsent) => unsent,
        };
        warn!(queue = %queue, job_id = %job_id, operation = %operation, "Caller no longer waiting for reply");

        // The runner gave up on this step; nothing else will release what it staged
        if let (Registration::Steps(stager), Ok(Output::Staged(handle))) =
            (&registration, unsent.result)
        {
            match stager.release(&handle).await {
                Ok(()) => info!(queue = %queue, job_id = %job_id, dir = %handle.dir.display(), "Released orphaned staging"),
                Err(e) => error!(queue = %queue, job_id = %job_id, error = %e, "Failed to release orphaned staging"),
            }
        }
    }

    /// Resolve the request against this worker's registration
    async fn execute(
        queue: &QueueId,
        registration: &Registration,
        job_id: &str,
        request: Request,
    ) -> Result<Output> {
        match (registration, request) {
            (Registration::Dispatcher(dispatcher), Request::SelectQueue) => {
                Ok(Output::Queue(dispatcher.select_queue()))
            }
            (Registration::Steps(stager), Request::Acquire(locator)) => {
                Ok(Output::Staged(stager.acquire(job_id, &locator).await?))
            }
            (Registration::Steps(stager), Request::Process(handle)) => {
                Ok(Output::Staged(stager.process(&handle).await?))
            }
            (Registration::Steps(stager), Request::Release(handle)) => {
                stager.release(&handle).await?;
                Ok(Output::Released)
            }
            (_, request) => Err(AppError::UnregisteredOperation {
                queue: queue.to_string(),
                operation: request.operation(),
            }),
        }
    }

    fn log_join(queue: &QueueId, joined: std::result::Result<(), tokio::task::JoinError>) {
        if let Err(join_err) = joined {
            if join_err.is_panic() {
                error!(queue = %queue, "Step panicked: {:?}", join_err);
            } else {
                error!(queue = %queue, "Step cancelled: {:?}", join_err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::RandomSelector;
    use crate::application::router::Router;
    use crate::domain::{QueuePool, ResourceLocator};
    use crate::port::resource_stager::mocks::MockStager;
    use crate::port::StepError;
    use std::collections::HashMap;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn spawn_worker(
        queue: &QueueId,
        registration: Registration,
        shutdown: ShutdownToken,
    ) -> (Router, tokio::task::JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(16);
        let operations = registration.operations().to_vec();
        let worker = Worker::new(queue.clone(), registration, operations, rx, 4);
        let (ready_tx, _ready_rx) = oneshot::channel();
        let handle = tokio::spawn(worker.run(shutdown, ready_tx));
        (Router::new(HashMap::from([(queue.clone(), tx)])), handle)
    }

    #[tokio::test]
    async fn test_pinned_worker_stamps_its_queue() {
        let queue = QueueId::new("pinned-1");
        let stager = Arc::new(MockStager::new_success());
        let (_tx, shutdown) = shutdown_channel();
        let (router, handle) = spawn_worker(&queue, Registration::Steps(stager.clone()), shutdown);

        let locator = ResourceLocator::parse("/data/in.txt").unwrap();
        let reply = router
            .call(&queue, "job-1", Request::Acquire(locator), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(reply.executed_on, queue);
        assert!(matches!(reply.result, Ok(Output::Staged(_))));
        assert_eq!(stager.call_count(Operation::Acquire), 1);

        drop(router);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pinned_worker_rejects_select_queue() {
        let queue = QueueId::new("pinned-1");
        let (_tx, shutdown) = shutdown_channel();
        let (router, _handle) = spawn_worker(
            &queue,
            Registration::Steps(Arc::new(MockStager::new_success())),
            shutdown,
        );

        let err = router
            .call(&queue, "job-1", Request::SelectQueue, TIMEOUT)
            .await
            .unwrap()
            .result
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::UnregisteredOperation {
                operation: Operation::SelectQueue,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_base_worker_serves_dispatcher_only() {
        let pool = Arc::new(QueuePool::from_ids(vec![QueueId::new("q-1")]).unwrap());
        let dispatcher = Arc::new(Dispatcher::new(pool, Box::new(RandomSelector::seeded(1))));
        let base = QueueId::distribution();
        let (_tx, shutdown) = shutdown_channel();
        let (router, _handle) = spawn_worker(&base, Registration::Dispatcher(dispatcher), shutdown);

        let reply = router
            .call(&base, "job-1", Request::SelectQueue, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply.result.unwrap(), Output::Queue(QueueId::new("q-1")));

        let locator = ResourceLocator::parse("/data/in.txt").unwrap();
        let err = router
            .call(&base, "job-1", Request::Acquire(locator), TIMEOUT)
            .await
            .unwrap()
            .result
            .unwrap_err();
        assert!(matches!(err, AppError::UnregisteredOperation { .. }));
    }

    #[tokio::test]
    async fn test_worker_keeps_serving_while_draining() {
        let queue = QueueId::new("pinned-1");
        let stager = Arc::new(MockStager::new_success());
        let (shutdown_tx, shutdown) = shutdown_channel();
        let (router, handle) = spawn_worker(&queue, Registration::Steps(stager), shutdown);

        shutdown_tx.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // In-flight jobs still need their remaining steps served
        let locator = ResourceLocator::parse("/data/in.txt").unwrap();
        let reply = router
            .call(&queue, "job-1", Request::Acquire(locator), TIMEOUT)
            .await
            .unwrap();
        assert!(reply.result.is_ok());
        assert!(!handle.is_finished());

        drop(router);
        tokio::time::timeout(TIMEOUT, handle)
            .await
            .expect("worker should exit once its queue closes")
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_resolve_registration_names() {
        let steps = Registration::Steps(Arc::new(MockStager::new_success()));

        let resolved = steps.resolve(&constants::PINNED_REGISTRATIONS).unwrap();
        assert_eq!(resolved, Operation::JOB_STEPS.to_vec());

        let err = steps.resolve(&["upload_file"]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));

        let err = steps.resolve(&constants::BASE_REGISTRATIONS).unwrap_err();
        assert!(err.to_string().contains("pinned"));
    }

    #[tokio::test]
    async fn test_worker_serves_only_resolved_operations() {
        let queue = QueueId::new("pinned-1");
        let registration = Registration::Steps(Arc::new(MockStager::new_success()));
        let operations = registration
            .resolve(&["download_file_to_worker_filesystem"])
            .unwrap();
        let (tx, rx) = mpsc::channel(16);
        let worker = Worker::new(queue.clone(), registration, operations, rx, 4);
        let (_shutdown_tx, shutdown) = shutdown_channel();
        let (ready_tx, _ready_rx) = oneshot::channel();
        tokio::spawn(worker.run(shutdown, ready_tx));
        let router = Router::new(HashMap::from([(queue.clone(), tx)]));

        let locator = ResourceLocator::parse("/data/in.txt").unwrap();
        let handle = match router
            .call(&queue, "job-1", Request::Acquire(locator), TIMEOUT)
            .await
            .unwrap()
            .result
            .unwrap()
        {
            Output::Staged(handle) => handle,
            other => panic!("unexpected output {:?}", other),
        };

        let err = router
            .call(&queue, "job-1", Request::Release(handle), TIMEOUT)
            .await
            .unwrap()
            .result
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::UnregisteredOperation {
                operation: Operation::Release,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_abandoned_acquire_is_released() {
        let queue = QueueId::new("pinned-1");
        let stager =
            Arc::new(MockStager::new_success().with_acquire_delay(Duration::from_millis(100)));
        let (_tx, shutdown) = shutdown_channel();
        let (router, handle) = spawn_worker(&queue, Registration::Steps(stager.clone()), shutdown);

        let locator = ResourceLocator::parse("/data/in.txt").unwrap();
        let err = router
            .call(&queue, "job-1", Request::Acquire(locator), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Step(StepError::TimedOut { .. })));

        drop(router);
        handle.await.unwrap().unwrap();

        assert_eq!(stager.call_count(Operation::Release), 1);
        assert_eq!(stager.staged_count(), 0);
    }
}
