//! The processor contract and the update handle processors report through.
//!
//! A [`Processor`] performs the actual generation work for a job. The
//! scheduler spawns `process` as an independent task and never awaits it.
//! Every code path, error paths included, must end with a terminal status
//! reported through [`JobUpdater`]: a processor that panics or returns early
//! without doing so leaves its job stuck in an active status, and the
//! scheduler has no way to repair that.

use async_trait::async_trait;
use atelier_core::job::{AssetRef, Job, JobOutput, JobPatch};
use atelier_core::status::JobStatus;
use atelier_core::types::JobId;

use crate::dispatcher::ModeConfig;
use crate::error::SchedulerResult;
use crate::scheduler::Scheduler;

/// Errors a processor may surface from [`Processor::regenerate`].
///
/// `process` reports failures through `JobUpdater::fail` instead.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("operation not supported by this processor")]
    Unsupported,

    #[error("generation backend error: {0}")]
    Backend(String),

    #[error("invalid backend output: {0}")]
    InvalidOutput(String),
}

/// Executes jobs of one or more modes.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Run `job` to completion, reporting every status change via `updater`.
    async fn process(&self, job: Job, config: ModeConfig, updater: JobUpdater);

    /// Regenerate the sub-asset at `index` of a completed job's output.
    async fn regenerate(
        &self,
        job: &Job,
        index: usize,
        config: &ModeConfig,
    ) -> Result<AssetRef, ProcessorError> {
        let _ = (job, index, config);
        Err(ProcessorError::Unsupported)
    }
}

/// Handle given to processors for reporting status changes.
///
/// Every call goes through the scheduler's update primitive and therefore
/// re-runs reconciliation.
#[derive(Clone, Debug)]
pub struct JobUpdater {
    scheduler: Scheduler,
}

impl JobUpdater {
    pub(crate) fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn update(&self, id: JobId, status: JobStatus, patch: JobPatch) -> SchedulerResult<()> {
        self.scheduler.update(id, status, patch)
    }

    /// Report an intermediate status with a progress percentage and message.
    pub fn progress(
        &self,
        id: JobId,
        status: JobStatus,
        progress: u8,
        message: impl Into<String>,
    ) -> SchedulerResult<()> {
        self.update(id, status, JobPatch::new().progress(progress).message(message))
    }

    pub fn complete(&self, id: JobId, output: JobOutput) -> SchedulerResult<()> {
        self.update(
            id,
            JobStatus::Completed,
            JobPatch::new().progress(100).output(output),
        )
    }

    pub fn fail(&self, id: JobId, error: impl Into<String>) -> SchedulerResult<()> {
        self.update(id, JobStatus::Failed, JobPatch::new().error(error))
    }
}
