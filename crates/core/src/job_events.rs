//! Event type names for job lifecycle events.
//!
//! Published by the scheduler on the event bus and forwarded verbatim to
//! WebSocket clients by the API.

/// A job was added to the registry.
pub const EVENT_JOB_QUEUED: &str = "job.queued";

/// The scheduler handed a job to its processor.
pub const EVENT_JOB_DISPATCHED: &str = "job.dispatched";

/// A processor reported an intermediate status or progress.
pub const EVENT_JOB_PROGRESS: &str = "job.progress";

/// A job reached `completed`.
pub const EVENT_JOB_COMPLETED: &str = "job.completed";

/// A job reached `failed`.
pub const EVENT_JOB_FAILED: &str = "job.failed";

/// A terminal job was reset to `queued`.
pub const EVENT_JOB_RETRIED: &str = "job.retried";

/// A completed job's output was edited (variant selection, regeneration).
pub const EVENT_JOB_OUTPUT_CHANGED: &str = "job.output_changed";

/// A job was removed from the registry.
pub const EVENT_JOB_REMOVED: &str = "job.removed";

/// Processing was enabled.
pub const EVENT_SCHEDULER_STARTED: &str = "scheduler.started";

/// Nothing queued or active remains; processing was switched off.
pub const EVENT_SCHEDULER_IDLE: &str = "scheduler.idle";
