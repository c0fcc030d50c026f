//! Read side: current status and result of a job.

use std::sync::Arc;

use tracing::instrument;

use jobpipe_core::{JobId, JobRecord};

use super::ServiceError;
use crate::jobs::JobStore;

/// Reads straight from the job store; nothing is cached.
#[derive(Clone)]
pub struct ResultQueryService {
    store: Arc<dyn JobStore>,
}

impl ResultQueryService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn get_result(&self, id: JobId) -> Result<JobRecord, ServiceError> {
        Ok(self.store.get_job(id).await?)
    }
}
