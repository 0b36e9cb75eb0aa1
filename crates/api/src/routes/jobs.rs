//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                  -> list_jobs
/// POST   /                  -> submit_jobs
/// GET    /{id}              -> get_job
/// DELETE /{id}              -> remove_job
/// POST   /{id}/retry        -> retry_job
/// POST   /{id}/select       -> select_variant
/// POST   /{id}/regenerate   -> regenerate_asset
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::submit_jobs))
        .route("/{id}", get(jobs::get_job).delete(jobs::remove_job))
        .route("/{id}/retry", post(jobs::retry_job))
        .route("/{id}/select", post(jobs::select_variant))
        .route("/{id}/regenerate", post(jobs::regenerate_asset))
}
