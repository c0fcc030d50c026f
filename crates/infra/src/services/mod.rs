//! Application services composing the job store and the queue.
//!
//! Both services take their collaborators as trait objects at construction, so
//! the same code runs against the in-memory adapters in tests and against
//! Postgres/Redis in production.

use jobpipe_core::{JobId, ValidationError};

use crate::jobs::JobStoreError;
use crate::queue::QueueError;

pub mod intake;
pub mod query;

pub use intake::IntakeService;
pub use query::ResultQueryService;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Client input was rejected before anything was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("job not found: {0}")]
    NotFound(JobId),
    /// The job store could not be reached or refused the operation.
    #[error("storage error: {0}")]
    Storage(String),
    /// The queue rejected the publish.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<JobStoreError> for ServiceError {
    fn from(value: JobStoreError) -> Self {
        match value {
            JobStoreError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Storage(other.to_string()),
        }
    }
}

impl From<QueueError> for ServiceError {
    fn from(value: QueueError) -> Self {
        ServiceError::Transport(value.to_string())
    }
}
