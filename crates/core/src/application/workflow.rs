//! Job runner - drives one job through dispatch, acquire, process, release
//!
//! Every step after dispatch is routed to the queue the dispatcher returned.
//! Step failures are recorded in the report and never retried here.

use crate::application::router::{Output, Request, Router};
use crate::application::worker::ShutdownToken;
use crate::domain::{Job, JobId, JobState, LocalHandle, Operation, QueueId};
use crate::error::{AppError, Result};
use crate::port::TimeProvider;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// One executed step and the queue it ran on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub operation: Operation,
    pub queue: QueueId,
}

/// Final outcome of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub locator: String,
    pub queue: Option<QueueId>,
    pub state: JobState,
    pub steps: Vec<StepRecord>,
    pub failed_operation: Option<Operation>,
    pub error: Option<String>,
    pub created_at: i64,
    pub finished_at: Option<i64>,
}

impl JobReport {
    fn from_job(
        job: &Job,
        steps: Vec<StepRecord>,
        failed_operation: Option<Operation>,
        error: Option<String>,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            locator: job.locator.as_str().to_string(),
            queue: job.queue.clone(),
            state: job.state,
            steps,
            failed_operation,
            error,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }

    /// True when every recorded step ran on the dispatched queue
    pub fn is_pinned(&self) -> bool {
        match &self.queue {
            Some(queue) => self.steps.iter().all(|step| &step.queue == queue),
            None => self.steps.is_empty(),
        }
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.steps.iter().map(|step| step.operation).collect()
    }
}

/// Drives a single job; one runner per job, spawned by the engine
pub struct JobRunner {
    router: Router,
    shutdown: ShutdownToken,
    time_provider: Arc<dyn TimeProvider>,
    step_timeout: Duration,
    steps: Vec<StepRecord>,
    failed_operation: Option<Operation>,
    error: Option<String>,
}

impl JobRunner {
    pub fn new(
        router: Router,
        shutdown: ShutdownToken,
        time_provider: Arc<dyn TimeProvider>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            router,
            shutdown,
            time_provider,
            step_timeout,
            steps: Vec::new(),
            failed_operation: None,
            error: None,
        }
    }

    /// Run the job to a terminal state and report it
    pub async fn run(mut self, mut job: Job) -> JobReport {
        if let Err(e) = self.drive(&mut job).await {
            // Only reachable through an engine-side bug (illegal transition);
            // still end in a terminal state so callers are never left waiting.
            error!(job_id = %job.id, error = %e, "Job runner aborted");
            job.state = JobState::Failed;
            job.finished_at = Some(self.time_provider.now_millis());
            if self.error.is_none() {
                self.error = Some(e.to_string());
            }
        }

        match job.state {
            JobState::Done => info!(job_id = %job.id, state = %job.state, "Job finished"),
            _ => warn!(job_id = %job.id, state = %job.state, "Job finished"),
        }
        JobReport::from_job(&job, self.steps, self.failed_operation, self.error)
    }

    async fn drive(&mut self, job: &mut Job) -> Result<()> {
        // Step boundary: a job that has not started yet is not started at all
        if self.shutdown.is_shutdown() {
            info!(job_id = %job.id, "Shutdown requested before first step, cancelling job");
            return self.finish(job, JobState::Cancelled);
        }

        let queue = match self.dispatch(&job.id).await {
            Ok(queue) => queue,
            Err(e) => {
                self.record_failure(job, Operation::SelectQueue, &e);
                return self.finish(job, JobState::Failed);
            }
        };
        job.assign_queue(queue.clone())?;
        info!(job_id = %job.id, queue = %queue, "Job pinned to queue");

        job.transition(JobState::Acquiring)?;
        let acquired = match self
            .step(&queue, &job.id, Request::Acquire(job.locator.clone()))
            .await
            .and_then(|output| staged(Operation::Acquire, output))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.record_failure(job, Operation::Acquire, &e);
                job.transition(JobState::Error)?;
                return self.finish(job, JobState::Failed);
            }
        };
        job.transition(JobState::Acquired)?;

        job.transition(JobState::Processing)?;
        let processed = match self
            .step(&queue, &job.id, Request::Process(acquired.clone()))
            .await
            .and_then(|output| staged(Operation::Process, output))
        {
            Ok(handle) => {
                job.transition(JobState::Processed)?;
                Some(handle)
            }
            Err(e) => {
                self.record_failure(job, Operation::Process, &e);
                job.transition(JobState::Error)?;
                None
            }
        };

        // Release runs on both paths so nothing stays staged on the worker
        job.transition(JobState::Releasing)?;
        let to_release = processed.unwrap_or(acquired);
        let released = self
            .step(&queue, &job.id, Request::Release(to_release))
            .await;
        if let Err(e) = &released {
            self.record_failure(job, Operation::Release, e);
        }

        if job.errored || released.is_err() {
            self.finish(job, JobState::Failed)
        } else {
            self.finish(job, JobState::Done)
        }
    }

    async fn dispatch(&mut self, job_id: &str) -> Result<QueueId> {
        let reply = self
            .router
            .call(
                &QueueId::distribution(),
                job_id,
                Request::SelectQueue,
                self.step_timeout,
            )
            .await?;
        match reply.result? {
            Output::Queue(queue) => Ok(queue),
            other => Err(AppError::Internal(format!(
                "dispatcher answered with {:?}",
                other
            ))),
        }
    }

    /// Route one job step and record where it executed.
    ///
    /// A step that reached a worker is recorded even when it failed.
    async fn step(&mut self, queue: &QueueId, job_id: &str, request: Request) -> Result<Output> {
        let operation = request.operation();
        let reply = self
            .router
            .call(queue, job_id, request, self.step_timeout)
            .await?;
        self.steps.push(StepRecord {
            operation,
            queue: reply.executed_on,
        });
        reply.result
    }

    fn record_failure(&mut self, job: &Job, operation: Operation, err: &AppError) {
        error!(job_id = %job.id, operation = %operation, error = %err, "Job step failed");
        if self.error.is_none() {
            self.failed_operation = Some(operation);
            self.error = Some(err.to_string());
        }
    }

    fn finish(&self, job: &mut Job, terminal: JobState) -> Result<()> {
        job.finish(terminal, self.time_provider.now_millis())?;
        Ok(())
    }
}

fn staged(operation: Operation, output: Output) -> Result<LocalHandle> {
    match output {
        Output::Staged(handle) => Ok(handle),
        other => Err(AppError::Internal(format!(
            "{} answered with {:?}",
            operation, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::{random_source, Dispatcher, RandomSelector};
    use crate::application::engine::StickyEngine;
    use crate::application::pool::{PoolConfig, WorkerPool};
    use crate::application::worker::{shutdown_channel, ShutdownSender};
    use crate::domain::QueuePool;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::resource_stager::mocks::{MockBehavior, MockStager};
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::ResourceStager;

    struct Harness {
        engine: StickyEngine,
        pool: WorkerPool,
        stager: Arc<MockStager>,
        shutdown: ShutdownSender,
        token: ShutdownToken,
    }

    async fn harness(stager: MockStager) -> Harness {
        let config = PoolConfig {
            size: 3,
            ..PoolConfig::default()
        };
        harness_with(stager, config).await
    }

    async fn harness_with(stager: MockStager, config: PoolConfig) -> Harness {
        let mut rng = random_source(Some(667));
        let queues = QueuePool::generate(config.size, &mut rng).unwrap();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(queues),
            Box::new(RandomSelector::from_rng(rng)),
        ));

        let stager = Arc::new(stager);
        let shared: Arc<dyn ResourceStager> = stager.clone();
        let factory = move |_queue: &QueueId| Arc::clone(&shared);

        let (shutdown, token) = shutdown_channel();
        let pool = WorkerPool::start(dispatcher, &factory, &config, token.clone())
            .await
            .unwrap();
        let engine = StickyEngine::new(
            pool.router(),
            token.clone(),
            Arc::new(SequentialIdProvider::default()),
            Arc::new(SystemTimeProvider),
            config.step_timeout,
        );

        Harness {
            engine,
            pool,
            stager,
            shutdown,
            token,
        }
    }

    #[tokio::test]
    async fn test_all_steps_run_on_dispatched_queue() {
        let h = harness(MockStager::new_success()).await;

        let report = h.engine.submit("/data/a.txt").unwrap().report().await.unwrap();

        assert_eq!(report.state, JobState::Done);
        assert_eq!(report.operations(), Operation::JOB_STEPS.to_vec());
        assert!(report.queue.is_some());
        assert!(report.is_pinned());
        assert!(report.error.is_none());
        assert!(report.finished_at.is_some());
        assert_eq!(h.stager.staged_count(), 0);

        drop(h.engine);
        h.pool.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_release_runs_after_process_failure() {
        let h = harness(MockStager::new_fail_process("malformed input")).await;

        let report = h.engine.submit("/data/a.txt").unwrap().report().await.unwrap();

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.failed_operation, Some(Operation::Process));
        assert!(report.error.as_deref().unwrap().contains("malformed input"));
        assert_eq!(report.operations(), Operation::JOB_STEPS.to_vec());
        assert!(report.is_pinned());
        assert_eq!(h.stager.released().len(), 1);
        assert_eq!(h.stager.staged_count(), 0, "nothing may leak after a failed process");
    }

    #[tokio::test]
    async fn test_acquire_failure_skips_release() {
        let h = harness(MockStager::new(MockBehavior::FailAcquire("not found".into()))).await;

        let report = h.engine.submit("/data/missing.txt").unwrap().report().await.unwrap();

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.failed_operation, Some(Operation::Acquire));
        assert_eq!(report.operations(), vec![Operation::Acquire]);
        assert_eq!(h.stager.call_count(Operation::Release), 0);
    }

    #[tokio::test]
    async fn test_timed_out_acquire_leaves_nothing_staged() {
        let config = PoolConfig {
            size: 1,
            step_timeout: Duration::from_millis(50),
            ..PoolConfig::default()
        };
        let stager = MockStager::new_success().with_acquire_delay(Duration::from_millis(200));
        let h = harness_with(stager, config).await;

        let report = h.engine.submit("/data/a.txt").unwrap().report().await.unwrap();

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.failed_operation, Some(Operation::Acquire));
        assert!(report.error.as_deref().unwrap().contains("timed out"));
        assert!(report.steps.is_empty());

        // The late acquire completes on the worker, which releases it
        drop(h.engine);
        h.pool.wait().await.unwrap();
        assert_eq!(h.stager.call_count(Operation::Release), 1);
        assert_eq!(h.stager.staged_count(), 0);
    }

    #[tokio::test]
    async fn test_release_failure_fails_job() {
        let h = harness(MockStager::new(MockBehavior::FailRelease("busy".into()))).await;

        let report = h.engine.submit("/data/a.txt").unwrap().report().await.unwrap();

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(report.failed_operation, Some(Operation::Release));
    }

    #[tokio::test]
    async fn test_runner_cancels_unstarted_job_after_shutdown() {
        let h = harness(MockStager::new_success()).await;
        h.shutdown.shutdown();

        // Runner built directly: the engine itself refuses new submissions
        let runner = JobRunner::new(
            h.pool.router(),
            h.token.clone(),
            Arc::new(SystemTimeProvider),
            Duration::from_secs(5),
        );
        let job = Job::new(
            "job-x",
            0,
            crate::domain::ResourceLocator::parse("/data/a.txt").unwrap(),
        );
        let report = runner.run(job).await;

        assert_eq!(report.state, JobState::Cancelled);
        assert!(report.steps.is_empty());
        assert!(report.queue.is_none());
        assert!(h.stager.calls().is_empty());
    }
}
