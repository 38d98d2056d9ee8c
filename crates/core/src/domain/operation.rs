// Operation table: registration names resolved to typed operations at startup

use serde::{Deserialize, Serialize};
use std::fmt;

/// An operation a worker can register and the engine can route by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Dispatcher: pick a sticky queue for a new job
    SelectQueue,
    /// Stage the external resource into worker-local storage
    Acquire,
    /// Transform the staged resource
    Process,
    /// Remove the staged resource
    Release,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::SelectQueue,
        Operation::Acquire,
        Operation::Process,
        Operation::Release,
    ];

    /// Steps every pinned worker serves, in execution order
    pub const JOB_STEPS: [Operation; 3] =
        [Operation::Acquire, Operation::Process, Operation::Release];

    /// Registration name the orchestration side uses to invoke this operation
    pub fn name(self) -> &'static str {
        match self {
            Operation::SelectQueue => "get_available_task_queue",
            Operation::Acquire => "download_file_to_worker_filesystem",
            Operation::Process => "work_on_file_in_worker_filesystem",
            Operation::Release => "clean_up_file_from_worker_filesystem",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
