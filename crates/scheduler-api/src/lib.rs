//! REST binding over the Engine Coordinator (§6). The REST layer's own
//! validation is intentionally thin: request shape is enforced by Serde,
//! every business rule is enforced by the Coordinator, and every error
//! it returns is translated by `error::HttpError`.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod response;

pub use handlers::ApiState;

use axum::{
    routing::{get, patch, post},
    Router,
};

/// Builds the job/DLQ/health router. Mounted as-is by `scheduler-server`,
/// which owns the surrounding middleware stack.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/jobs", post(handlers::create_job).get(handlers::list_jobs))
        .route(
            "/jobs/:id",
            get(handlers::get_job)
                .put(handlers::update_job)
                .delete(handlers::delete_job),
        )
        .route("/jobs/:id/run", post(handlers::run_job_now))
        .route("/jobs/:id/status", patch(handlers::toggle_status))
        .route("/dlq", get(handlers::list_dlq))
        .route("/dlq/:id/reactivate", post(handlers::reactivate_dlq))
        .route("/dlq/:id/complete", post(handlers::complete_dlq))
        .route("/health", get(handlers::health))
        .route("/health/detail", get(handlers::health_detail))
        .with_state(state)
}
