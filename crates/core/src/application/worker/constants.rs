// Worker constants (no magic values)
use std::time::Duration;

/// Number of sticky queues (and pinned workers) when not configured
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Upper bound on steps one worker runs at the same time
pub const DEFAULT_MAX_CONCURRENT_STEPS: usize = 100;

/// Start-to-close timeout for a single routed operation (60s)
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Buffered tasks per queue before senders wait
pub const TASK_CHANNEL_CAPACITY: usize = 1024;

/// Orchestration backend endpoint when not configured
pub const DEFAULT_BACKEND_ENDPOINT: &str = "localhost:7233";

/// Startup handshake timeout against the backend (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Names the base worker registers on the distribution queue
pub const BASE_REGISTRATIONS: [&str; 1] = ["get_available_task_queue"];

/// Names every pinned worker registers on its own queue
pub const PINNED_REGISTRATIONS: [&str; 3] = [
    "download_file_to_worker_filesystem",
    "work_on_file_in_worker_filesystem",
    "clean_up_file_from_worker_filesystem",
];
