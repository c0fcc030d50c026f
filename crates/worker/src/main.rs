//! Standalone worker process: consumes `tasks_queue` from Redis Streams and
//! records outcomes in Postgres.
//!
//! Run as many of these as needed; each registers its loops as separate
//! consumers in the same group and Redis arbitrates deliveries.

use std::sync::Arc;

use anyhow::{bail, Context};
use uuid::Uuid;

use jobpipe_compute::ComputeRegistry;
use jobpipe_infra::config::{self, AppConfig};
use jobpipe_infra::jobs::{JobExecutor, PostgresJobStore};
use jobpipe_infra::queue::RedisStreamsJobQueue;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_dotenv();
    jobpipe_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    config.log_summary();

    // The in-memory queue only exists inside the API process.
    let Some(database) = config.database.as_ref().filter(|_| config.use_persistent_stores) else {
        bail!("the worker requires USE_PERSISTENT_STORES=true and a Postgres configuration");
    };

    let store = PostgresJobStore::connect(&database.url())
        .await
        .context("failed to connect to Postgres")?;
    let queue = RedisStreamsJobQueue::connect(&config.redis_url)
        .await
        .context("failed to connect to Redis")?
        .with_redelivery(config.worker.claim_idle, config.worker.max_deliveries);

    let registry = ComputeRegistry::with_defaults();
    tracing::info!(operations = ?registry.operations(), "registered backends");

    let name = format!("worker-{}", Uuid::now_v7().simple());
    let workers = JobExecutor::new(Arc::new(store), Arc::new(queue), registry)
        .spawn(config.worker.worker_config(name.as_str()));
    tracing::info!(worker = %name, loops = workers.loops(), "worker started");

    shutdown_signal().await;

    tracing::info!(worker = %name, "shutting down");
    let stats = workers.shutdown().await;
    tracing::info!(
        worker = %name,
        processed = stats.processed,
        completed = stats.completed,
        failed = stats.failed,
        dead_lettered = stats.dead_lettered,
        store_failures = stats.store_failures,
        "worker stopped"
    );
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
