//! REST handlers binding the §6 HTTP surface onto the Coordinator.
//!
//! Each handler is a thin translation: decode the request, call the
//! Coordinator, translate the result into the envelope the table in §6
//! names. No business logic lives here.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use scheduler_coordinator::Coordinator;
use scheduler_core::job::{Job, JobInput, JobStatus};
use scheduler_health::HealthChecker;
use serde::Deserialize;

use crate::error::{HttpError, HttpResult};
use crate::extract::{ListQuery, PathId};
use crate::response::{Created, JobEnvelope, MessageOnly, Updated};

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    pub health: Arc<HealthChecker>,
}

pub async fn create_job(
    State(state): State<ApiState>,
    Json(input): Json<JobInput>,
) -> HttpResult<Created<Job>> {
    let job = state.coordinator.create(input).await?;
    Ok(Created(JobEnvelope {
        message: "job created".to_string(),
        job,
    }))
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> HttpResult<Json<Vec<Job>>> {
    let status = match query.status.as_deref() {
        None => None,
        Some("ACTIVE") => Some(JobStatus::Active),
        Some("INACTIVE") => Some(JobStatus::Inactive),
        Some("FAILED") => Some(JobStatus::Failed),
        Some(other) => {
            return Err(HttpError::bad_request(format!(
                "unrecognized status filter '{other}'"
            )))
        }
    };
    let jobs = state.coordinator.list(status).await?;
    Ok(Json(jobs))
}

pub async fn get_job(State(state): State<ApiState>, PathId(id): PathId) -> HttpResult<Json<Job>> {
    let job = state.coordinator.get(id).await?;
    Ok(Json(job))
}

pub async fn update_job(
    State(state): State<ApiState>,
    PathId(id): PathId,
    Json(input): Json<JobInput>,
) -> HttpResult<Updated<Job>> {
    let job = state.coordinator.update(id, input).await?;
    Ok(Updated(JobEnvelope {
        message: "job updated".to_string(),
        job,
    }))
}

pub async fn delete_job(
    State(state): State<ApiState>,
    PathId(id): PathId,
) -> HttpResult<MessageOnly> {
    state.coordinator.delete(id).await?;
    Ok(MessageOnly::new("job deleted"))
}

pub async fn run_job_now(
    State(state): State<ApiState>,
    PathId(id): PathId,
) -> HttpResult<MessageOnly> {
    state.coordinator.run_now(id).await?;
    Ok(MessageOnly::new("job queued for immediate run"))
}

#[derive(Debug, Deserialize)]
pub struct ToggleStatusBody {
    pub status: JobStatus,
}

pub async fn toggle_status(
    State(state): State<ApiState>,
    PathId(id): PathId,
    Json(body): Json<ToggleStatusBody>,
) -> HttpResult<Json<Job>> {
    let job = state.coordinator.toggle_status(id, body.status).await?;
    Ok(Json(job))
}

pub async fn list_dlq(State(state): State<ApiState>) -> HttpResult<Json<Vec<Job>>> {
    let jobs = state.coordinator.list_dlq().await?;
    Ok(Json(jobs))
}

pub async fn reactivate_dlq(
    State(state): State<ApiState>,
    PathId(id): PathId,
) -> HttpResult<MessageOnly> {
    state.coordinator.reactivate(id).await?;
    Ok(MessageOnly::new("job reactivated"))
}

pub async fn complete_dlq(
    State(state): State<ApiState>,
    PathId(id): PathId,
) -> HttpResult<MessageOnly> {
    state.coordinator.complete(id).await?;
    Ok(MessageOnly::new("job marked complete"))
}

pub async fn health(State(state): State<ApiState>) -> Json<scheduler_health::HealthSummary> {
    let report = state.health.check().await;
    Json(report.summary())
}

pub async fn health_detail(State(state): State<ApiState>) -> Json<scheduler_health::HealthReport> {
    let report = state.health.check().await;
    Json(report)
}
