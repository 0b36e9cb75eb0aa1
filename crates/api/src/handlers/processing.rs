//! Handlers for the `/processing` resource: the scheduler's dispatch flag.

use atelier_scheduler::StatusCounts;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProcessingStatus {
    pub processing: bool,
    pub counts: StatusCounts,
    pub in_flight_tasks: usize,
}

fn snapshot(state: &AppState) -> ProcessingStatus {
    ProcessingStatus {
        processing: state.scheduler.is_processing(),
        counts: state.scheduler.counts(),
        in_flight_tasks: state.scheduler.in_flight_tasks(),
    }
}

/// GET /api/v1/processing
pub async fn processing_status(
    State(state): State<AppState>,
) -> Json<DataResponse<ProcessingStatus>> {
    Json(DataResponse {
        data: snapshot(&state),
    })
}

/// POST /api/v1/processing/start
///
/// Enables dispatching. With nothing queued or active the flag switches
/// straight back off, which the response reflects.
pub async fn start_processing(
    State(state): State<AppState>,
) -> Json<DataResponse<ProcessingStatus>> {
    state.scheduler.start_processing();
    Json(DataResponse {
        data: snapshot(&state),
    })
}

/// POST /api/v1/processing/stop
///
/// Stops dispatching new jobs. Running processors are not interrupted.
pub async fn stop_processing(
    State(state): State<AppState>,
) -> Json<DataResponse<ProcessingStatus>> {
    state.scheduler.stop_processing();
    Json(DataResponse {
        data: snapshot(&state),
    })
}
