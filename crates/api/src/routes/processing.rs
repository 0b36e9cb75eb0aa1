use axum::routing::{get, post};
use axum::Router;

use crate::handlers::processing;
use crate::state::AppState;

/// Routes mounted at `/processing`.
///
/// ```text
/// GET    /          -> processing_status
/// POST   /start     -> start_processing
/// POST   /stop      -> stop_processing
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(processing::processing_status))
        .route("/start", post(processing::start_processing))
        .route("/stop", post(processing::stop_processing))
}
