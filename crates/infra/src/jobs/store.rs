//! Job storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use jobpipe_core::{JobId, JobRecord, JobStatus};

/// Durable job state, keyed by store-assigned id.
///
/// Implementations must be safe for concurrent use: intake creates rows from
/// many request tasks while workers update them.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a `received` row with an empty result and return its new id.
    async fn create_job(&self) -> Result<JobId, JobStoreError>;

    /// Move a `received` job to a terminal status.
    ///
    /// Rows that are already terminal are left untouched and reported as
    /// [`UpdateOutcome::AlreadyTerminal`], so redelivered descriptors converge.
    async fn update_job(
        &self,
        id: JobId,
        status: JobStatus,
        result: &str,
    ) -> Result<UpdateOutcome, JobStoreError>;

    /// Current status and result of a job.
    async fn get_job(&self, id: JobId) -> Result<JobRecord, JobStoreError>;

    /// Remove a job (used to roll back a submit whose publish failed).
    async fn delete_job(&self, id: JobId) -> Result<(), JobStoreError>;

    /// Round-trip to the backing database; in-process stores are always ready.
    async fn ping(&self) -> Result<(), JobStoreError> {
        Ok(())
    }
}

/// What `update_job` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    AlreadyTerminal,
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("invalid transition for job {id}: {to} is not a terminal status")]
    InvalidTransition { id: JobId, to: JobStatus },
    #[error("storage error: {0}")]
    Storage(String),
}

pub(crate) fn ensure_terminal(id: JobId, status: JobStatus) -> Result<(), JobStoreError> {
    if status.is_terminal() {
        Ok(())
    } else {
        Err(JobStoreError::InvalidTransition { id, to: status })
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    next_id: AtomicI64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of rows currently held.
    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job table lock poisoned".to_string())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self) -> Result<JobId, JobStoreError> {
        let id = JobId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        jobs.insert(id, JobRecord::received(id));
        Ok(id)
    }

    async fn update_job(
        &self,
        id: JobId,
        status: JobStatus,
        result: &str,
    ) -> Result<UpdateOutcome, JobStoreError> {
        ensure_terminal(id, status)?;

        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if job.status.is_terminal() {
            return Ok(UpdateOutcome::AlreadyTerminal);
        }

        job.status = status;
        job.result = result.to_string();
        job.updated_at = Utc::now();
        Ok(UpdateOutcome::Applied)
    }

    async fn get_job(&self, id: JobId) -> Result<JobRecord, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        jobs.get(&id).cloned().ok_or(JobStoreError::NotFound(id))
    }

    async fn delete_job(&self, id: JobId) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        jobs.remove(&id).map(|_| ()).ok_or(JobStoreError::NotFound(id))
    }
}
