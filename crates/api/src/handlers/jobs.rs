//! Handlers for the `/jobs` resource.

use atelier_core::error::CoreError;
use atelier_core::job::{Job, JobSubmission};
use atelier_core::mode::Mode;
use atelier_core::status::JobStatus;
use atelier_core::types::JobId;
use atelier_scheduler::StatusCounts;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Body of `POST /jobs`. At most 500 jobs per request.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitJobs {
    #[validate(length(min = 1, max = 500))]
    pub jobs: Vec<JobSubmission>,
    /// Enable processing right after the jobs are added.
    #[serde(default)]
    pub start: bool,
}

#[derive(Debug, Serialize)]
pub struct SubmittedJobs {
    pub ids: Vec<JobId>,
    pub processing: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub mode: Option<Mode>,
}

#[derive(Debug, Serialize)]
pub struct JobList {
    pub jobs: Vec<Job>,
    pub counts: StatusCounts,
    pub processing: bool,
}

#[derive(Debug, Deserialize)]
pub struct IndexRequest {
    pub index: usize,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn find_job(state: &AppState, id: JobId) -> AppResult<Job> {
    state.scheduler.get(id).ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: id.to_string(),
        })
    })
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Append jobs in the given order. Every submission is validated first; one
/// invalid entry rejects the whole batch. Returns 201 with the new ids.
pub async fn submit_jobs(
    State(state): State<AppState>,
    Json(input): Json<SubmitJobs>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let ids = state.scheduler.add(input.jobs)?;
    tracing::info!(count = ids.len(), start = input.start, "Jobs submitted");
    if input.start {
        state.scheduler.start_processing();
    }

    let data = SubmittedJobs {
        ids,
        processing: state.scheduler.is_processing(),
    };
    Ok((StatusCode::CREATED, Json(DataResponse { data })))
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs
///
/// All jobs in submission order, optionally filtered by `status` and `mode`.
/// Counts always cover the whole collection.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.scheduler.query(|job| {
        params.status.map_or(true, |s| job.status == s)
            && params.mode.map_or(true, |m| job.mode == m)
    });

    let data = JobList {
        jobs,
        counts: state.scheduler.counts(),
        processing: state.scheduler.is_processing(),
    };
    Ok(Json(DataResponse { data }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state, job_id)?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Remove
// ---------------------------------------------------------------------------

/// DELETE /api/v1/jobs/{id}
///
/// Returns 204. A processor already running for the job keeps running;
/// its later updates are dropped.
pub async fn remove_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<StatusCode> {
    state.scheduler.remove(job_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/retry
///
/// Requeue a completed or failed job. Returns 409 for any other status.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    state.scheduler.retry(job_id)?;
    let job = find_job(&state, job_id)?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/select
pub async fn select_variant(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<IndexRequest>,
) -> AppResult<impl IntoResponse> {
    state.scheduler.select_variant(job_id, input.index)?;
    let job = find_job(&state, job_id)?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/regenerate
///
/// Starts regenerating one asset and returns 202 with the job in its
/// transient status. Completion arrives as a `job.output_changed` event.
pub async fn regenerate_asset(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<IndexRequest>,
) -> AppResult<impl IntoResponse> {
    state.scheduler.regenerate_asset(job_id, input.index)?;
    let job = find_job(&state, job_id)?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}
