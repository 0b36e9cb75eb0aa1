//! Job-scoped mutation operations layered on the scheduler lock.
//!
//! Each operation touches one job and finishes with a reconciliation pass,
//! exactly like [`Scheduler::update`].

use atelier_core::job::{AssetRef, JobPatch, OutputIndexError};
use atelier_core::job_events::{EVENT_JOB_OUTPUT_CHANGED, EVENT_JOB_PROGRESS, EVENT_JOB_RETRIED};
use atelier_core::status::JobStatus;
use atelier_core::types::JobId;
use atelier_events::JobEvent;
use tracing::Instrument;

use crate::error::{SchedulerError, SchedulerResult};
use crate::processor::ProcessorError;
use crate::scheduler::Scheduler;

impl Scheduler {
    /// Put a completed or failed job back in the queue.
    ///
    /// Clears the error together with the stale progress and progress
    /// message of the previous attempt; the previous output is kept until
    /// the new attempt overwrites it. Enables processing if it was off.
    pub fn retry(&self, id: JobId) -> SchedulerResult<()> {
        let dispatches = {
            let mut state = self.lock();
            let job = state
                .registry
                .get_mut(&id)
                .ok_or(SchedulerError::JobNotFound(id))?;
            if !job.status.is_terminal() {
                return Err(SchedulerError::NotRetryable {
                    id,
                    status: job.status,
                });
            }

            job.progress = None;
            job.progress_message = None;
            job.apply(JobStatus::Queued, JobPatch::new());
            tracing::info!(job_id = %id, mode = %job.mode, "Job retried");
            self.publish(JobEvent::new(EVENT_JOB_RETRIED).for_job(job));

            self.enable_processing(&mut state);
            self.reconcile(&mut state)
        };
        self.spawn_all(dispatches);
        Ok(())
    }

    /// Choose one of a completed job's generated variants (or hooks).
    ///
    /// The job stays `completed`.
    pub fn select_variant(&self, id: JobId, index: usize) -> SchedulerResult<()> {
        let mut state = self.lock();
        let job = state
            .registry
            .get_mut(&id)
            .ok_or(SchedulerError::JobNotFound(id))?;
        if job.status != JobStatus::Completed {
            return Err(SchedulerError::NotCompleted {
                id,
                status: job.status,
            });
        }

        let mode = job.mode;
        let output = job
            .output
            .as_mut()
            .ok_or(SchedulerError::NotSelectable { id, mode })?;
        output.select(index).map_err(|e| match e {
            OutputIndexError::NotIndexable => SchedulerError::NotSelectable { id, mode },
            OutputIndexError::OutOfRange { index, len } => {
                SchedulerError::IndexOutOfRange { id, index, len }
            }
        })?;
        job.updated_at = chrono::Utc::now();

        tracing::info!(job_id = %id, %mode, index, "Variant selected");
        self.publish(
            JobEvent::new(EVENT_JOB_OUTPUT_CHANGED)
                .for_job(job)
                .with_payload(serde_json::json!({ "selected": index })),
        );
        Ok(())
    }

    /// Regenerate one sub-asset of a completed job's output.
    ///
    /// The job moves to its mode's transient regeneration status, which
    /// counts against the mode's concurrency limit; the call is rejected
    /// with [`SchedulerError::NoCapacity`] when the mode is full. The
    /// processor's `regenerate` runs as a detached task. On success the one
    /// asset is replaced; on failure the old asset is kept and the failure
    /// is noted in the progress message. Either way the job returns to
    /// `completed`.
    pub fn regenerate_asset(&self, id: JobId, index: usize) -> SchedulerResult<()> {
        let (snapshot, route, transient) = {
            let mut state = self.lock();
            let job = state
                .registry
                .get(&id)
                .ok_or(SchedulerError::JobNotFound(id))?;
            if job.status != JobStatus::Completed {
                return Err(SchedulerError::NotCompleted {
                    id,
                    status: job.status,
                });
            }

            let mode = job.mode;
            let transient = mode
                .regenerate_status()
                .ok_or(SchedulerError::NotRegenerable { id, mode })?;
            let len = job
                .output
                .as_ref()
                .and_then(|output| output.asset_count())
                .ok_or(SchedulerError::NotRegenerable { id, mode })?;
            if index >= len {
                return Err(SchedulerError::IndexOutOfRange { id, index, len });
            }

            let route = self
                .dispatcher()
                .resolve(mode)
                .cloned()
                .ok_or(SchedulerError::NoProcessor(mode))?;
            if state.registry.active_count(mode) >= route.concurrency_limit {
                return Err(SchedulerError::NoCapacity {
                    mode,
                    limit: route.concurrency_limit,
                });
            }

            let job = state
                .registry
                .update(
                    &id,
                    transient,
                    JobPatch::new().message(format!("Regenerating item {}", index + 1)),
                )
                .ok_or(SchedulerError::JobNotFound(id))?;
            tracing::info!(job_id = %id, %mode, index, "Regenerating asset");
            self.publish(JobEvent::new(EVENT_JOB_PROGRESS).for_job(job));
            (job.clone(), route, transient)
        };

        let scheduler = self.clone();
        let span = tracing::info_span!("regenerate", job_id = %id, index);
        self.spawn_tracked(
            async move {
                let result = route
                    .processor
                    .regenerate(&snapshot, index, &route.config)
                    .await;
                scheduler.finish_regeneration(id, index, transient, result);
            }
            .instrument(span),
        );
        Ok(())
    }

    /// Apply a regeneration result and return the job to `completed`.
    ///
    /// Discarded if the job was removed, retried, or otherwise moved off the
    /// transient status while the regeneration ran.
    fn finish_regeneration(
        &self,
        id: JobId,
        index: usize,
        transient: JobStatus,
        result: Result<AssetRef, ProcessorError>,
    ) {
        let dispatches = {
            let mut state = self.lock();
            let Some(job) = state.registry.get_mut(&id) else {
                tracing::debug!(job_id = %id, "Regenerated job no longer exists");
                return;
            };
            if job.status != transient {
                tracing::warn!(
                    job_id = %id,
                    status = %job.status,
                    "Job changed during regeneration; discarding result",
                );
                return;
            }

            let message = match result {
                Ok(asset) => match job.output.as_mut().map(|o| o.replace_asset(index, asset)) {
                    Some(Ok(())) => {
                        tracing::info!(job_id = %id, index, "Asset regenerated");
                        format!("Regenerated item {}", index + 1)
                    }
                    _ => {
                        tracing::warn!(
                            job_id = %id,
                            index,
                            "Regenerated asset no longer fits output",
                        );
                        format!("Regeneration of item {} could not be applied", index + 1)
                    }
                },
                Err(e) => {
                    tracing::warn!(job_id = %id, index, error = %e, "Asset regeneration failed");
                    format!("Regeneration failed: {e}")
                }
            };

            job.apply(JobStatus::Completed, JobPatch::new().message(message));
            self.publish(JobEvent::new(EVENT_JOB_OUTPUT_CHANGED).for_job(job));
            self.reconcile(&mut state)
        };
        self.spawn_all(dispatches);
    }
}
