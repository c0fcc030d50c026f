//! Intake: validate, persist, enqueue.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use jobpipe_core::{JobDescriptor, JobId, SubmitRequest};

use super::ServiceError;
use crate::jobs::JobStore;
use crate::queue::JobQueue;

/// Accepts submissions and hands them to the workers.
///
/// A submit either leaves a `received` row with a published descriptor, or
/// leaves nothing: if the publish fails the freshly created row is deleted
/// again before the error is returned.
#[derive(Clone)]
pub struct IntakeService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl IntakeService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Validate `body`, create the job row and publish its descriptor.
    #[instrument(skip(self, body), fields(body_len = body.len()))]
    pub async fn submit(&self, body: &[u8]) -> Result<JobId, ServiceError> {
        let request = SubmitRequest::from_json(body).map_err(|e| {
            warn!(error = %e, "rejected submission");
            ServiceError::Validation(e)
        })?;

        let job_id = self.store.create_job().await.map_err(|e| {
            error!(operation = %request.operation, error = %e, "failed to create job");
            ServiceError::from(e)
        })?;

        let descriptor = JobDescriptor::new(job_id, request.operation, request.data);

        if let Err(e) = self.queue.publish(&descriptor).await {
            error!(
                job_id = %job_id,
                operation = %descriptor.operation,
                error = %e,
                "failed to publish descriptor; rolling back job"
            );
            if let Err(rollback) = self.store.delete_job(job_id).await {
                error!(job_id = %job_id, error = %rollback, "rollback of unpublished job failed");
            }
            return Err(e.into());
        }

        info!(job_id = %job_id, operation = %descriptor.operation, "job accepted");
        Ok(job_id)
    }
}
