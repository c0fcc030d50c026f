use std::sync::Arc;

use anyhow::Context;

use jobpipe_compute::ComputeRegistry;
use jobpipe_infra::config::AppConfig;
use jobpipe_infra::jobs::{InMemoryJobStore, JobExecutor, PostgresJobStore, WorkerHandle};
use jobpipe_infra::queue::{InMemoryJobQueue, RedisStreamsJobQueue};
use jobpipe_infra::{IntakeService, JobQueue, JobStore, ResultQueryService, ServiceError};

/// Services shared by every request handler.
#[derive(Clone)]
pub struct AppServices {
    pub intake: IntakeService,
    pub query: ResultQueryService,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl AppServices {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            intake: IntakeService::new(store.clone(), queue.clone()),
            query: ResultQueryService::new(store.clone()),
            store,
            queue,
        }
    }

    /// Both backends answer a round-trip.
    pub async fn check_ready(&self) -> Result<(), ServiceError> {
        self.store.ping().await?;
        self.queue.ping().await?;
        Ok(())
    }
}

/// Wired services plus the worker pool the API runs in-process, if any.
pub struct AppRuntime {
    pub services: Arc<AppServices>,
    pub workers: Option<WorkerHandle>,
}

pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppRuntime> {
    if config.use_persistent_stores {
        return build_persistent_services(config).await;
    }
    Ok(build_in_memory_services(config))
}

/// In-memory store + queue (dev/test). Nothing else can reach the queue, so
/// the worker pool runs inside this process.
fn build_in_memory_services(config: &AppConfig) -> AppRuntime {
    let store: Arc<dyn JobStore> = InMemoryJobStore::arc();
    let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::with_redelivery(
        config.worker.claim_idle,
        config.worker.max_deliveries,
    ));

    let workers = JobExecutor::new(store.clone(), queue.clone(), ComputeRegistry::with_defaults())
        .spawn(config.worker.worker_config("api-worker"));
    tracing::info!(
        loops = workers.loops(),
        "using in-memory job store and queue with in-process workers"
    );

    AppRuntime {
        services: Arc::new(AppServices::new(store, queue)),
        workers: Some(workers),
    }
}

/// Postgres store + Redis Streams queue; workers run as separate processes.
async fn build_persistent_services(config: &AppConfig) -> anyhow::Result<AppRuntime> {
    let database = config
        .database
        .as_ref()
        .context("persistent stores enabled without a database configuration")?;

    let store = PostgresJobStore::connect(&database.url())
        .await
        .context("failed to connect to Postgres")?;
    let queue = RedisStreamsJobQueue::connect(&config.redis_url)
        .await
        .context("failed to connect to Redis")?
        .with_redelivery(config.worker.claim_idle, config.worker.max_deliveries);
    tracing::info!(stream = queue.stream_key(), "using Postgres job store and Redis Streams queue");

    Ok(AppRuntime {
        services: Arc::new(AppServices::new(Arc::new(store), Arc::new(queue))),
        workers: None,
    })
}
