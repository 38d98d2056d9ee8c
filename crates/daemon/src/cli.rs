//! Command-line and environment configuration
//!
//! Every flag falls back to a `STICKY_*` environment variable.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use sticky_core::application::worker::constants::{
    DEFAULT_BACKEND_ENDPOINT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_CONCURRENT_STEPS,
    DEFAULT_POOL_SIZE, DEFAULT_STEP_TIMEOUT,
};
use sticky_core::application::PoolConfig;

const DEFAULT_STAGING_DIR: &str = "~/.sticky/staging";

/// How the dispatcher picks a queue for each new job
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SelectionPolicy {
    /// Uniform random over the pool
    Random,
    /// Cycle through the pool in order
    RoundRobin,
}

#[derive(Debug, Parser)]
#[command(name = "sticky-worker", version, about = "Sticky queue worker pool")]
pub struct Args {
    /// Orchestration backend endpoint (host:port)
    #[arg(long, env = "STICKY_ENDPOINT", default_value = DEFAULT_BACKEND_ENDPOINT)]
    pub endpoint: String,

    /// Number of sticky queues, one pinned worker each
    #[arg(long, env = "STICKY_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE, value_parser = parse_pool_size)]
    pub pool_size: usize,

    /// Fixed seed for reproducible queue names and selection (test mode)
    #[arg(long, env = "STICKY_SEED")]
    pub seed: Option<u64>,

    /// Queue selection policy
    #[arg(long, env = "STICKY_POLICY", value_enum, default_value_t = SelectionPolicy::Random)]
    pub policy: SelectionPolicy,

    /// Root directory for worker-local staging
    #[arg(long, env = "STICKY_STAGING_DIR", default_value = DEFAULT_STAGING_DIR)]
    pub staging_dir: String,

    /// Start-to-close timeout for each routed step, in seconds
    #[arg(long, env = "STICKY_STEP_TIMEOUT_SECS", default_value_t = DEFAULT_STEP_TIMEOUT.as_secs())]
    pub step_timeout_secs: u64,

    /// Steps a single worker may run at the same time
    #[arg(long, env = "STICKY_MAX_CONCURRENT_STEPS", default_value_t = DEFAULT_MAX_CONCURRENT_STEPS)]
    pub max_concurrent_steps: usize,

    /// Backend handshake timeout, in seconds
    #[arg(long, env = "STICKY_CONNECT_TIMEOUT_SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT.as_secs())]
    pub connect_timeout_secs: u64,

    /// Resources to submit as jobs once every worker is listening
    pub locators: Vec<String>,
}

impl Args {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            size: self.pool_size,
            seed: self.seed,
            max_concurrent_steps: self.max_concurrent_steps,
            step_timeout: Duration::from_secs(self.step_timeout_secs),
        }
    }

    pub fn staging_root(&self) -> PathBuf {
        shellexpand::tilde(&self.staging_dir).into_owned().into()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn parse_pool_size(s: &str) -> Result<usize, String> {
    let size: usize = s
        .parse()
        .map_err(|_| format!("pool size must be a positive integer, got {:?}", s))?;
    if size == 0 {
        return Err("pool size must be at least 1".to_string());
    }
    Ok(size)
}
