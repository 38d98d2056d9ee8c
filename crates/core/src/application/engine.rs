//! Sticky engine - job intake on top of a running worker pool
//!
//! Each submission spawns one job runner. The engine tracks no routing state
//! of its own beyond the router it was given.

use crate::application::router::Router;
use crate::application::worker::ShutdownToken;
use crate::application::workflow::{JobReport, JobRunner};
use crate::domain::{Job, JobId, ResourceLocator};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, TimeProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Handle to a submitted job
pub struct JobTicket {
    pub job_id: JobId,
    handle: JoinHandle<JobReport>,
}

impl JobTicket {
    /// Wait for the job to reach a terminal state
    pub async fn report(self) -> Result<JobReport> {
        self.handle
            .await
            .map_err(|e| AppError::Internal(format!("job runner {} failed: {}", self.job_id, e)))
    }
}

/// Engine (job submission)
pub struct StickyEngine {
    router: Router,
    shutdown: ShutdownToken,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    step_timeout: Duration,
}

impl StickyEngine {
    pub fn new(
        router: Router,
        shutdown: ShutdownToken,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            router,
            shutdown,
            id_provider,
            time_provider,
            step_timeout,
        }
    }

    /// Submit a new job for `locator`
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// - AppError::Interrupted once shutdown was requested
    /// - AppError::Validation if the locator is empty
    pub fn submit(&self, locator: impl Into<String>) -> Result<JobTicket> {
        if self.shutdown.is_shutdown() {
            return Err(AppError::Interrupted);
        }

        let locator = ResourceLocator::parse(locator)
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let job = Job::new(
            self.id_provider.generate_id(),
            self.time_provider.now_millis(),
            locator,
        );
        let job_id = job.id.clone();
        info!(job_id = %job_id, locator = %job.locator.as_str(), "Job submitted");

        let runner = JobRunner::new(
            self.router.clone(),
            self.shutdown.clone(),
            Arc::clone(&self.time_provider),
            self.step_timeout,
        );
        let handle = tokio::spawn(runner.run(job));

        Ok(JobTicket { job_id, handle })
    }
}
