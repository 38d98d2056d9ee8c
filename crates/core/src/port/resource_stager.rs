// Resource Stager Port
// The three job steps a pinned worker executes against worker-local storage

use crate::domain::{LocalHandle, Operation, QueueId, ResourceLocator};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Step-level failures, reported to the job runner as-is
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    #[error("Processing failed: {0}")]
    Processing(String),

    #[error("Release failed: {0}")]
    Release(String),

    #[error("{operation} timed out after {after_ms}ms")]
    TimedOut { operation: Operation, after_ms: u64 },
}

/// Resource Stager trait
///
/// Implementations:
/// - FileStager: copies files into a per-worker staging directory
/// - MockStager: in-memory, for tests
#[async_trait]
pub trait ResourceStager: Send + Sync {
    /// Fetch the resource behind `locator` into worker-local storage
    ///
    /// # Errors
    /// - StepError::Acquisition on not-found, permission or transfer failure.
    ///   Nothing is left staged when this fails.
    async fn acquire(
        &self,
        job_id: &str,
        locator: &ResourceLocator,
    ) -> Result<LocalHandle, StepError>;

    /// Run the job's transformation on a staged resource
    ///
    /// # Errors
    /// - StepError::Processing on malformed input or transformation failure
    async fn process(&self, handle: &LocalHandle) -> Result<LocalHandle, StepError>;

    /// Remove the staged resource. Releasing twice is a no-op.
    async fn release(&self, handle: &LocalHandle) -> Result<(), StepError>;
}

/// Builds the stager a pinned worker owns for its queue
pub trait StagerFactory: Send + Sync {
    fn stager_for(&self, queue: &QueueId) -> Arc<dyn ResourceStager>;
}

impl<F> StagerFactory for F
where
    F: Fn(&QueueId) -> Arc<dyn ResourceStager> + Send + Sync,
{
    fn stager_for(&self, queue: &QueueId) -> Arc<dyn ResourceStager> {
        self(queue)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock stager behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Every step succeeds
        Success,
        /// Acquire fails with message
        FailAcquire(String),
        /// Process fails with message
        FailProcess(String),
        /// Release fails with message
        FailRelease(String),
    }

    /// Mock Resource Stager for testing
    ///
    /// Staged "directories" are tracked in memory so tests can check for leaks
    /// and for the side effects of repeated releases.
    pub struct MockStager {
        behavior: MockBehavior,
        acquire_delay: Duration,
        process_delay: Duration,
        calls: Mutex<Vec<(String, Operation)>>,
        staged: Mutex<HashSet<PathBuf>>,
        released: Mutex<Vec<PathBuf>>,
        in_process: AtomicUsize,
    }

    impl MockStager {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                acquire_delay: Duration::ZERO,
                process_delay: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
                staged: Mutex::new(HashSet::new()),
                released: Mutex::new(Vec::new()),
                in_process: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail_process(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::FailProcess(message.into()))
        }

        pub fn with_process_delay(mut self, delay: Duration) -> Self {
            self.process_delay = delay;
            self
        }

        pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
            self.acquire_delay = delay;
            self
        }

        /// Every step invocation as `(job_id, operation)`, in call order
        pub fn calls(&self) -> Vec<(String, Operation)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self, operation: Operation) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, op)| *op == operation)
                .count()
        }

        /// Directories actually removed (repeated releases are not listed again)
        pub fn released(&self) -> Vec<PathBuf> {
            self.released.lock().unwrap().clone()
        }

        /// Directories still staged
        pub fn staged_count(&self) -> usize {
            self.staged.lock().unwrap().len()
        }

        /// Jobs currently inside `process`
        pub fn in_process(&self) -> usize {
            self.in_process.load(Ordering::SeqCst)
        }

        fn record(&self, job_id: &str, operation: Operation) {
            self.calls
                .lock()
                .unwrap()
                .push((job_id.to_string(), operation));
        }

        fn job_of(handle: &LocalHandle) -> String {
            handle
                .dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ResourceStager for MockStager {
        async fn acquire(
            &self,
            job_id: &str,
            locator: &ResourceLocator,
        ) -> Result<LocalHandle, StepError> {
            self.record(job_id, Operation::Acquire);

            let behavior = self.behavior.clone();
            if let MockBehavior::FailAcquire(msg) = behavior {
                return Err(StepError::Acquisition(format!("{}: {}", locator.as_str(), msg)));
            }
            if !self.acquire_delay.is_zero() {
                tokio::time::sleep(self.acquire_delay).await;
            }

            let dir = Path::new("/mock/staging").join(job_id);
            self.staged.lock().unwrap().insert(dir.clone());
            Ok(LocalHandle::new(dir.clone(), dir.join("input")))
        }

        async fn process(&self, handle: &LocalHandle) -> Result<LocalHandle, StepError> {
            self.record(&Self::job_of(handle), Operation::Process);

            self.in_process.fetch_add(1, Ordering::SeqCst);
            if !self.process_delay.is_zero() {
                tokio::time::sleep(self.process_delay).await;
            }
            self.in_process.fetch_sub(1, Ordering::SeqCst);

            let behavior = self.behavior.clone();
            if let MockBehavior::FailProcess(msg) = behavior {
                return Err(StepError::Processing(msg));
            }
            Ok(LocalHandle::new(handle.dir.clone(), handle.dir.join("output")))
        }

        async fn release(&self, handle: &LocalHandle) -> Result<(), StepError> {
            self.record(&Self::job_of(handle), Operation::Release);

            let behavior = self.behavior.clone();
            if let MockBehavior::FailRelease(msg) = behavior {
                return Err(StepError::Release(msg));
            }

            if self.staged.lock().unwrap().remove(&handle.dir) {
                self.released.lock().unwrap().push(handle.dir.clone());
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_release_twice_has_one_side_effect() {
            let stager = MockStager::new_success();
            let locator = ResourceLocator::parse("/data/a.txt").unwrap();

            let handle = stager.acquire("job-1", &locator).await.unwrap();
            assert_eq!(stager.staged_count(), 1);

            stager.release(&handle).await.unwrap();
            stager.release(&handle).await.unwrap();

            assert_eq!(stager.released(), vec![handle.dir.clone()]);
            assert_eq!(stager.staged_count(), 0);
            assert_eq!(stager.call_count(Operation::Release), 2);
        }
    }
}
