pub mod health;
pub mod jobs;
pub mod processing;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                 WebSocket job event stream
///
/// /jobs                               list, submit
/// /jobs/{id}                          get, remove
/// /jobs/{id}/retry                    retry a completed or failed job (POST)
/// /jobs/{id}/select                   choose a variant or hook (POST)
/// /jobs/{id}/regenerate               regenerate one output asset (POST)
///
/// /processing                         processing flag and job counts
/// /processing/start                   enable dispatching (POST)
/// /processing/stop                    stop dispatching (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/jobs", jobs::router())
        .nest("/processing", processing::router())
}
