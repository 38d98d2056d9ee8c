//! Graceful shutdown with jobs in flight
//!
//! Shutdown while three jobs sit inside `process`: intake stops, the three jobs
//! still run to completion on their queues, a job whose runner never started
//! is cancelled, and the pool's completion future resolves once every worker
//! has exited.

use std::sync::Arc;
use std::time::Duration;
use sticky_core::application::{
    random_source, shutdown_channel, Dispatcher, PoolConfig, RandomSelector, ShutdownSender,
    StickyEngine, WorkerPool,
};
use sticky_core::domain::{JobState, Operation, QueueId, QueuePool};
use sticky_core::port::id_provider::mocks::SequentialIdProvider;
use sticky_core::port::resource_stager::mocks::MockStager;
use sticky_core::port::time_provider::SystemTimeProvider;
use sticky_core::port::ResourceStager;
use sticky_core::AppError;
use tokio::time::{sleep, timeout};

async fn start(stager: Arc<MockStager>) -> (WorkerPool, StickyEngine, ShutdownSender) {
    let mut rng = random_source(Some(7));
    let queues = QueuePool::generate(3, &mut rng).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(queues),
        Box::new(RandomSelector::from_rng(rng)),
    ));

    let shared: Arc<dyn ResourceStager> = stager;
    let factory = move |_queue: &QueueId| Arc::clone(&shared);

    let (shutdown, token) = shutdown_channel();
    let config = PoolConfig::default();
    let pool = WorkerPool::start(dispatcher, &factory, &config, token.clone())
        .await
        .unwrap();
    let engine = StickyEngine::new(
        pool.router(),
        token,
        Arc::new(SequentialIdProvider::default()),
        Arc::new(SystemTimeProvider),
        config.step_timeout,
    );
    (pool, engine, shutdown)
}

#[tokio::test]
async fn test_in_flight_jobs_finish_after_shutdown() {
    let stager = Arc::new(MockStager::new_success().with_process_delay(Duration::from_millis(300)));
    let (pool, engine, shutdown) = start(Arc::clone(&stager)).await;

    let tickets: Vec<_> = ["/data/a.txt", "/data/b.txt", "/data/c.txt"]
        .into_iter()
        .map(|locator| engine.submit(locator).unwrap())
        .collect();

    timeout(Duration::from_secs(5), async {
        while stager.in_process() < 3 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("all three jobs should reach process");

    // Accepted, but its runner is first polled after shutdown was requested
    let unstarted = engine.submit("/data/d.txt").unwrap();
    shutdown.shutdown();
    assert!(matches!(engine.submit("/data/late.txt"), Err(AppError::Interrupted)));
    drop(engine);

    timeout(Duration::from_secs(5), pool.wait())
        .await
        .expect("workers should exit after the drain")
        .unwrap();

    for ticket in tickets {
        let report = ticket.report().await.unwrap();
        assert!(
            matches!(report.state, JobState::Done | JobState::Failed),
            "job {} ended {}",
            report.job_id,
            report.state
        );
        assert!(report.is_pinned());
    }

    let cancelled = unstarted.report().await.unwrap();
    assert_eq!(cancelled.state, JobState::Cancelled);
    assert!(cancelled.steps.is_empty());
    assert!(cancelled.queue.is_none());
    assert!(cancelled.finished_at.is_some());

    assert_eq!(stager.call_count(Operation::Acquire), 3);
    assert_eq!(stager.staged_count(), 0);
}

#[tokio::test]
async fn test_idle_pool_stops_on_shutdown() {
    let stager = Arc::new(MockStager::new_success());
    let (pool, engine, shutdown) = start(stager).await;

    shutdown.shutdown();
    drop(engine);

    timeout(Duration::from_secs(2), pool.wait())
        .await
        .expect("idle workers should exit promptly")
        .unwrap();
}

#[tokio::test]
async fn test_completion_waits_for_outstanding_router() {
    let stager = Arc::new(MockStager::new_success());
    let (pool, engine, shutdown) = start(stager).await;

    shutdown.shutdown();
    // Engine still holds a router: workers keep draining and do not exit
    let pending = timeout(Duration::from_millis(100), pool.wait()).await;
    assert!(pending.is_err());

    drop(engine);
}
