use atelier_core::error::CoreError;
use atelier_scheduler::SchedulerError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`], [`SchedulerError`] and request validation failures.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `atelier_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A rejected scheduler operation.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// A request body that failed field validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core_error(core),
            AppError::Scheduler(err) => classify_scheduler_error(err),
            AppError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                errors.to_string(),
            ),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn classify_core_error(err: &CoreError) -> (StatusCode, &'static str, String) {
    match err {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

/// Map a scheduler rejection to an HTTP status and error code.
///
/// - Unknown job ids map to 404.
/// - Operations that do not fit the job's current status, or a full mode,
///   map to 409.
/// - Bad indices and unsupported targets map to 400.
fn classify_scheduler_error(err: &SchedulerError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        SchedulerError::JobNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
        SchedulerError::NotRetryable { .. }
        | SchedulerError::NotCompleted { .. }
        | SchedulerError::InvalidTransition { .. } => {
            (StatusCode::CONFLICT, "INVALID_STATUS", message)
        }
        SchedulerError::NoCapacity { .. } => (StatusCode::CONFLICT, "NO_CAPACITY", message),
        SchedulerError::NoProcessor(_) => (StatusCode::CONFLICT, "NO_PROCESSOR", message),
        SchedulerError::NotSelectable { .. }
        | SchedulerError::NotRegenerable { .. }
        | SchedulerError::IndexOutOfRange { .. }
        | SchedulerError::OutputModeMismatch { .. } => {
            (StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
        }
        SchedulerError::Core(core) => classify_core_error(core),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use atelier_core::mode::Mode;
    use atelier_core::status::JobStatus;
    use atelier_core::types::new_job_id;

    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn scheduler_errors_map_to_http_statuses() {
        let id = new_job_id();
        assert_eq!(
            status_of(SchedulerError::JobNotFound(id).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                SchedulerError::NotRetryable {
                    id,
                    status: JobStatus::Matting
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                SchedulerError::NoCapacity {
                    mode: Mode::Refresh,
                    limit: 5
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                SchedulerError::IndexOutOfRange {
                    id,
                    index: 9,
                    len: 4
                }
                .into()
            ),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn wrapped_core_validation_is_bad_request() {
        let err = SchedulerError::Core(CoreError::Validation("missing asset".into()));
        assert_eq!(status_of(err.into()), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn scheduler_errors_convert_without_unwrapping_core() {
        let err: AppError = SchedulerError::Core(CoreError::Conflict("seeded".into())).into();
        assert_matches!(
            err,
            AppError::Scheduler(SchedulerError::Core(CoreError::Conflict(_)))
        );
        assert_eq!(status_of(err), StatusCode::CONFLICT);
    }

    #[test]
    fn core_internal_errors_hide_details() {
        let response = AppError::from(CoreError::Internal("lock poisoned".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
