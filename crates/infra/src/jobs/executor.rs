//! Worker executor: pulls descriptors off the queue, runs the backend and
//! records the outcome in the job store.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use jobpipe_compute::ComputeRegistry;
use jobpipe_core::{JobDescriptor, JobId, JobStatus};

use super::store::{JobStore, JobStoreError, UpdateOutcome};
use crate::queue::{Delivery, JobQueue, QueueError};

/// Pause after a transport error before asking for work again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Consumer name prefix; loop `n` registers as `<name>-<n>`.
    pub name: String,
    /// Number of independent consumer loops.
    pub concurrency: usize,
    /// How long one `receive` may wait for a delivery.
    pub block: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            concurrency: 1,
            block: Duration::from_millis(1000),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = block;
        self
    }
}

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Backend succeeded; job is `completed`.
    Completed(JobId),
    /// Backend rejected the operands; job is `failed`.
    Failed(JobId),
    /// The job was already terminal (a redelivery); acknowledged without changes.
    Duplicate(JobId),
    /// The job row no longer exists; acknowledged and dropped.
    Orphaned(JobId),
    /// Store update failed; left unacknowledged for redelivery.
    Retry(JobId),
    /// Undecodable or unroutable; moved to the dead-letter queue.
    DeadLettered,
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub processed: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub store_failures: u64,
}

impl ExecutorStats {
    fn record(&mut self, outcome: &ProcessOutcome) {
        self.processed += 1;
        match outcome {
            ProcessOutcome::Completed(_) => self.completed += 1,
            ProcessOutcome::Failed(_) => self.failed += 1,
            ProcessOutcome::DeadLettered => self.dead_lettered += 1,
            ProcessOutcome::Retry(_) => self.store_failures += 1,
            ProcessOutcome::Duplicate(_) | ProcessOutcome::Orphaned(_) => {}
        }
    }
}

/// Handle to control a running worker pool.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for every loop to finish its
    /// current delivery. Returns the final statistics.
    pub async fn shutdown(self) -> ExecutorStats {
        let _ = self.shutdown.send(true);
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker loop terminated abnormally");
            }
        }
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Snapshot of the pool's statistics.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn loops(&self) -> usize {
        self.joins.len()
    }
}

/// Queue-driven job executor.
///
/// Cheap to clone; every loop of a pool shares the same store, queue and
/// registry.
#[derive(Clone)]
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
    registry: Arc<ComputeRegistry>,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        registry: ComputeRegistry,
    ) -> Self {
        Self {
            store,
            queue,
            registry: Arc::new(registry),
        }
    }

    /// Handle one delivery end to end.
    ///
    /// The delivery is acknowledged only once its outcome is durable (or it
    /// was dead-lettered). Errors are transport failures while acking.
    pub async fn process(&self, delivery: &Delivery) -> Result<ProcessOutcome, QueueError> {
        let descriptor = match JobDescriptor::from_json(&delivery.body) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(
                    delivery_id = %delivery.delivery_id,
                    body = %delivery.body_lossy(),
                    error = %e,
                    "undecodable descriptor; dead-lettering"
                );
                self.queue
                    .dead_letter(delivery, &format!("decode: {e}"))
                    .await?;
                return Ok(ProcessOutcome::DeadLettered);
            }
        };

        let job_id = descriptor.id;
        let Some(backend) = self.registry.get(&descriptor.operation).cloned() else {
            warn!(
                job_id = %job_id,
                operation = %descriptor.operation,
                delivery_id = %delivery.delivery_id,
                "unknown operation; dead-lettering"
            );
            self.queue.dead_letter(delivery, "unknown operation").await?;
            return Ok(ProcessOutcome::DeadLettered);
        };

        debug!(
            job_id = %job_id,
            operation = %descriptor.operation,
            attempts = delivery.attempts,
            "executing job"
        );

        let operands = descriptor.data;
        let computed = tokio::task::spawn_blocking(move || backend.compute(&operands)).await;
        let (status, result) = match computed {
            Ok(Ok(value)) => (JobStatus::Completed, value),
            Ok(Err(e)) => (JobStatus::Failed, format!("error: {e}")),
            Err(e) => (JobStatus::Failed, format!("error: backend panicked: {e}")),
        };

        match self.store.update_job(job_id, status, &result).await {
            Ok(UpdateOutcome::Applied) => {
                self.queue.ack(delivery).await?;
                info!(job_id = %job_id, status = %status, "job finished");
                Ok(match status {
                    JobStatus::Completed => ProcessOutcome::Completed(job_id),
                    _ => ProcessOutcome::Failed(job_id),
                })
            }
            Ok(UpdateOutcome::AlreadyTerminal) => {
                self.queue.ack(delivery).await?;
                debug!(job_id = %job_id, "job already terminal; redelivery acknowledged");
                Ok(ProcessOutcome::Duplicate(job_id))
            }
            Err(JobStoreError::NotFound(_)) => {
                self.queue.ack(delivery).await?;
                warn!(job_id = %job_id, "job row missing; dropping delivery");
                Ok(ProcessOutcome::Orphaned(job_id))
            }
            Err(e) => {
                error!(
                    job_id = %job_id,
                    delivery_id = %delivery.delivery_id,
                    attempts = delivery.attempts,
                    error = %e,
                    "failed to record job outcome; leaving delivery for redelivery"
                );
                Ok(ProcessOutcome::Retry(job_id))
            }
        }
    }

    /// Spawn `config.concurrency` consumer loops on the current runtime.
    pub fn spawn(self, config: WorkerConfig) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));

        let joins = (0..config.concurrency.max(1))
            .map(|n| {
                let consumer = format!("{}-{}", config.name, n);
                tokio::spawn(consumer_loop(
                    self.clone(),
                    consumer,
                    config.block,
                    shutdown_rx.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        WorkerHandle {
            shutdown: shutdown_tx,
            joins,
            stats,
        }
    }
}

async fn consumer_loop(
    executor: JobExecutor,
    consumer: String,
    block: Duration,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(consumer = %consumer, "worker loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = executor.queue.receive(&consumer, block) => received,
        };

        match received {
            Ok(Some(delivery)) => match executor.process(&delivery).await {
                Ok(outcome) => {
                    if let Ok(mut s) = stats.lock() {
                        s.record(&outcome);
                    }
                }
                Err(e) => {
                    error!(
                        consumer = %consumer,
                        delivery_id = %delivery.delivery_id,
                        error = %e,
                        "failed to acknowledge delivery"
                    );
                }
            },
            Ok(None) => {}
            Err(e) => {
                error!(consumer = %consumer, error = %e, "failed to receive from queue");
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(RECEIVE_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    info!(consumer = %consumer, "worker loop stopped");
}
