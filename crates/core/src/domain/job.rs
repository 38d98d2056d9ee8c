// Job Domain Model

use super::error::{DomainError, Result};
use super::queue::QueueId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Job ID (UUID v4)
pub type JobId = String;

/// Reference to the external resource a job works on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceLocator(String);

impl ResourceLocator {
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "resource locator cannot be empty".to_string(),
            ));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Worker-local staged resource
///
/// `dir` is owned by exactly one job on exactly one worker; `file` is the
/// current artifact inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalHandle {
    pub dir: PathBuf,
    pub file: PathBuf,
}

impl LocalHandle {
    pub fn new(dir: impl Into<PathBuf>, file: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file: file.into(),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }
}

/// Job state, observed from the worker side
///
/// ```text
/// Pending -> Acquiring -> Acquired -> Processing -> Processed -> Releasing -> Done
///              |                         |
///              +--------> Error <--------+
///                           |
///                           +--> Releasing -> Failed   (something was staged)
///                           +--> Failed                (nothing was staged)
/// Pending -> Cancelled  (shutdown before the first step)
/// Pending -> Failed     (dispatch itself failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Acquiring,
    Acquired,
    Processing,
    Processed,
    Releasing,
    Done,
    Error,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// `Releasing -> Done` is only legal for a job that never hit `Error`;
    /// `Job::transition` enforces that part.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Acquiring)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Acquiring, Acquired)
                | (Acquiring, Error)
                | (Acquired, Processing)
                | (Processing, Processed)
                | (Processing, Error)
                | (Processed, Releasing)
                | (Error, Releasing)
                | (Error, Failed)
                | (Releasing, Done)
                | (Releasing, Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Acquiring => "ACQUIRING",
            JobState::Acquired => "ACQUIRED",
            JobState::Processing => "PROCESSING",
            JobState::Processed => "PROCESSED",
            JobState::Releasing => "RELEASING",
            JobState::Done => "DONE",
            JobState::Error => "ERROR",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub locator: ResourceLocator,
    /// Set once by the dispatcher, never changed afterwards
    pub queue: Option<QueueId>,
    pub state: JobState,
    /// Set when the job passes through `Error`; forbids a clean `Done`
    pub errored: bool,

    pub created_at: i64, // epoch ms
    pub finished_at: Option<i64>,
}

impl Job {
    /// Create a new pending job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `locator` - Resource the job works on
    pub fn new(id: impl Into<String>, created_at: i64, locator: ResourceLocator) -> Self {
        Self {
            id: id.into(),
            locator,
            queue: None,
            state: JobState::Pending,
            errored: false,
            created_at,
            finished_at: None,
        }
    }

    /// Pin the job to a queue. Assignment is immutable once made.
    pub fn assign_queue(&mut self, queue: QueueId) -> Result<()> {
        if let Some(existing) = &self.queue {
            return Err(DomainError::QueueAlreadyAssigned {
                job_id: self.id.clone(),
                queue: existing.to_string(),
            });
        }
        self.queue = Some(queue);
        Ok(())
    }

    /// Move to `next`, rejecting edges outside the state machine
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        let clean_finish_after_error = self.errored && next == JobState::Done;
        if !self.state.can_transition_to(next) || clean_finish_after_error {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        if next == JobState::Error {
            self.errored = true;
        }
        self.state = next;
        Ok(())
    }

    /// Transition into a terminal state with explicit timestamp
    pub fn finish(&mut self, terminal: JobState, now_millis: i64) -> Result<()> {
        if !terminal.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: terminal.to_string(),
            });
        }
        self.transition(terminal)?;
        self.finished_at = Some(now_millis);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn job() -> Job {
        Job::new("job-1", 1000, ResourceLocator::parse("/tmp/input.txt").unwrap())
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();
        for next in [
            JobState::Acquiring,
            JobState::Acquired,
            JobState::Processing,
            JobState::Processed,
            JobState::Releasing,
        ] {
            assert_ok!(job.transition(next));
        }
        assert_ok!(job.finish(JobState::Done, 2000));

        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.finished_at, Some(2000));
    }

    #[test]
    fn test_error_path_cannot_finish_done() {
        let mut job = job();
        job.transition(JobState::Acquiring).unwrap();
        job.transition(JobState::Acquired).unwrap();
        job.transition(JobState::Processing).unwrap();
        job.transition(JobState::Error).unwrap();
        job.transition(JobState::Releasing).unwrap();

        assert_err!(job.finish(JobState::Done, 2000));
        assert_ok!(job.finish(JobState::Failed, 2000));
        assert_eq!(job.state, JobState::Failed);
    }

    #[test]
    fn test_skipping_steps_rejected() {
        let mut job = job();
        let err = job.transition(JobState::Processing).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                from: "PENDING".to_string(),
                to: "PROCESSING".to_string(),
            }
        );
        assert_eq!(job.state, JobState::Pending);
    }

    #[test]
    fn test_error_not_reachable_from_releasing() {
        assert!(!JobState::Releasing.can_transition_to(JobState::Error));
        assert!(!JobState::Acquired.can_transition_to(JobState::Error));
        assert!(!JobState::Done.can_transition_to(JobState::Releasing));
    }

    #[test]
    fn test_queue_assignment_is_immutable() {
        let mut job = job();
        job.assign_queue(QueueId::new("q-1")).unwrap();

        let err = job.assign_queue(QueueId::new("q-2")).unwrap_err();
        assert!(matches!(err, DomainError::QueueAlreadyAssigned { .. }));
        assert_eq!(job.queue, Some(QueueId::new("q-1")));
    }

    #[test]
    fn test_empty_locator_rejected() {
        assert_err!(ResourceLocator::parse("  "));
    }
}
