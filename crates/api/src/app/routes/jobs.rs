use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use jobpipe_core::{JobId, ValidationError};

use crate::app::dto::{JobResponse, SubmitResponse};
use crate::app::errors;
use crate::app::services::AppServices;

/// `POST /calculate` with `{"operation": ..., "data": [...]}`.
///
/// The raw body is validated by the intake service so malformed JSON and
/// wrong shapes produce the same error body.
pub async fn submit_job(
    Extension(services): Extension<Arc<AppServices>>,
    body: Bytes,
) -> axum::response::Response {
    match services.intake.submit(&body).await {
        Ok(id) => (StatusCode::ACCEPTED, Json(SubmitResponse::accepted(id))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_result(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match id.parse::<JobId>() {
        Ok(id) => id,
        // Integers outside the id range were never created.
        Err(ValidationError::UnassignableId(raw)) => {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("job {raw} not found"),
            );
        }
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()),
    };

    match services.query.get_result(id).await {
        Ok(job) => (StatusCode::OK, Json(JobResponse::from(job))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
