use serde::Serialize;

use jobpipe_core::{JobId, JobRecord, JobStatus};

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: JobId,
    pub status: JobStatus,
}

impl SubmitResponse {
    pub fn accepted(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Received,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: JobId,
    pub status: JobStatus,
    pub result: String,
}

impl From<JobRecord> for JobResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            status: job.status,
            result: job.result,
        }
    }
}
