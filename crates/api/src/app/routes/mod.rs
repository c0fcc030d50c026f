use axum::{
    routing::{get, post},
    Router,
};

pub mod jobs;
pub mod system;

pub fn router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/ready", get(system::ready))
        .route("/calculate", post(jobs::submit_job))
        .route("/result/:id", get(jobs::get_result))
}
