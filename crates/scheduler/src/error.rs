use atelier_core::error::CoreError;
use atelier_core::mode::Mode;
use atelier_core::status::JobStatus;
use atelier_core::types::JobId;

/// Errors returned by scheduler operations.
///
/// These are all caller errors: the scheduler's own transitions are pure
/// in-memory state changes and cannot fail.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("Job {id} is {status}; only completed or failed jobs can be retried")]
    NotRetryable { id: JobId, status: JobStatus },

    #[error("Job {id} is {status}; the operation requires a completed job")]
    NotCompleted { id: JobId, status: JobStatus },

    #[error("Job {id} ({mode}) has no selectable variants")]
    NotSelectable { id: JobId, mode: Mode },

    #[error("Job {id} ({mode}) has no regenerable assets")]
    NotRegenerable { id: JobId, mode: Mode },

    #[error("Index {index} out of range for job {id} ({len} items)")]
    IndexOutOfRange { id: JobId, index: usize, len: usize },

    #[error("Output for mode {actual} cannot be stored on job {id} ({expected})")]
    OutputModeMismatch {
        id: JobId,
        expected: Mode,
        actual: Mode,
    },

    #[error("Job {id} cannot move from {from} to {to} outside of dispatch")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Mode {mode} is at its concurrency limit ({limit})")]
    NoCapacity { mode: Mode, limit: usize },

    #[error("No processor registered for mode {0}")]
    NoProcessor(Mode),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Convenience alias for scheduler results.
pub type SchedulerResult<T> = Result<T, SchedulerError>;
