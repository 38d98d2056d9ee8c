//! Sticky Worker - Main Entry Point
//! Base dispatcher worker + one pinned worker per sticky queue

mod cli;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

use sticky_core::application::{
    random_source, shutdown_channel, Dispatcher, JobTicket, QueueSelector, RandomSelector,
    RoundRobinSelector, StickyEngine, WorkerPool,
};
use sticky_core::domain::QueuePool;
use sticky_core::port::id_provider::UuidProvider;
use sticky_core::port::time_provider::SystemTimeProvider;
use sticky_core::port::BackendConnector;
use sticky_core::VERSION;
use sticky_infra_system::{FileStagerFactory, TcpBackendConnector};

use crate::cli::{Args, SelectionPolicy};

const LOG_FILE_PREFIX: &str = "sticky-worker.log";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Initialize logging
    let _log_guard = init_logging()?;
    info!("Sticky worker v{} starting...", VERSION);
    if telemetry::requested_but_disabled() {
        warn!("OTLP endpoint set but this build has no `telemetry` feature (ignoring)");
    }

    // 2. Connect to the orchestration backend (fatal on failure)
    let connector = TcpBackendConnector::new(args.connect_timeout());
    let connection = connector
        .connect(&args.endpoint)
        .await
        .with_context(|| format!("cannot reach orchestration backend at {}", args.endpoint))?;
    info!(endpoint = %connection.endpoint, "Backend connection established");

    // 3. Queue pool + dispatcher (one random source for both)
    let config = args.pool_config();
    let mut rng = random_source(config.seed);
    let queues = Arc::new(QueuePool::generate(config.size, &mut rng)?);
    if let Some(seed) = config.seed {
        info!(seed, "Deterministic queue selection enabled (test mode)");
    }
    let selector: Box<dyn QueueSelector> = match args.policy {
        SelectionPolicy::Random => Box::new(RandomSelector::from_rng(rng)),
        SelectionPolicy::RoundRobin => Box::new(RoundRobinSelector::default()),
    };
    info!(policy = selector.name(), "Queue selection policy");
    let dispatcher = Arc::new(Dispatcher::new(queues, selector));

    // 4. Start workers
    let staging_root = args.staging_root();
    info!(staging_root = %staging_root.display(), pool_size = config.size, "Starting workers...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let pool = WorkerPool::start(
        dispatcher,
        &FileStagerFactory::new(staging_root),
        &config,
        shutdown_rx.clone(),
    )
    .await?;
    println!("All workers started, ctrl+c to exit");

    // 5. Submit jobs given on the command line
    let engine = StickyEngine::new(
        pool.router(),
        shutdown_rx,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
        config.step_timeout,
    );
    let mut reports = JoinSet::new();
    for locator in &args.locators {
        match engine.submit(locator.as_str()) {
            Ok(ticket) => {
                reports.spawn(log_report(ticket));
            }
            Err(e) => error!(locator = %locator, error = %e, "Job submission rejected"),
        }
    }

    // 6. Wait for shutdown signal, logging reports as they arrive
    let signal = wait_for_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            received = &mut signal => {
                received?;
                break;
            }
            Some(joined) = reports.join_next(), if !reports.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Report task failed");
                }
            }
        }
    }

    // 7. Graceful shutdown: no new jobs, drain in-flight steps, stop workers
    println!("\nShutting down workers");
    info!("Shutdown signal received. Draining...");
    shutdown_tx.shutdown();
    drop(engine);
    pool.wait().await?;
    while let Some(joined) = reports.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Report task failed");
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

/// Pretty or JSON console output, optional daily log file, optional OTLP export
fn init_logging() -> Result<Option<WorkerGuard>> {
    let log_format = std::env::var("STICKY_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("sticky=info"))
        .context("invalid log filter")?;

    let (file_layer, guard) = match std::env::var("STICKY_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(telemetry::layer::<Registry>()?)
        .with(env_filter)
        .with(file_layer);

    match log_format.as_str() {
        "json" => registry.with(fmt::layer().json()).try_init()?,
        _ => registry.with(fmt::layer().pretty()).try_init()?,
    }
    Ok(guard)
}

async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            received = tokio::signal::ctrl_c() => received?,
            _ = terminate.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok(())
    }
}

async fn log_report(ticket: JobTicket) {
    let job_id = ticket.job_id.clone();
    match ticket.report().await {
        Ok(report) => match serde_json::to_string(&report) {
            Ok(json) => info!(job_id = %job_id, state = %report.state, report = %json, "Job report"),
            Err(e) => warn!(job_id = %job_id, error = %e, "Job report not serializable"),
        },
        Err(e) => error!(job_id = %job_id, error = %e, "Job runner failed"),
    }
}
