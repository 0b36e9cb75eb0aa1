//! Batch runner: seed a scheduler with a job batch and drive it until idle.

use std::sync::Arc;

use atelier_core::job::JobSubmission;
use atelier_core::job_events::EVENT_SCHEDULER_IDLE;
use atelier_scheduler::{Processor, Scheduler, SchedulerError, SchedulerResult, StatusCounts};
use tokio::sync::broadcast::error::RecvError;

use crate::api::GenerationApi;
use crate::backend::{DryRunBackend, HttpBackend};
use crate::config::WorkerConfig;
use crate::processor::StagedProcessor;

/// The processor every mode is routed to, chosen by configuration.
pub fn build_processor(config: &WorkerConfig) -> Arc<dyn Processor> {
    match &config.backend_url {
        Some(url) => {
            tracing::info!(backend_url = %url, "Using HTTP generation backend");
            Arc::new(StagedProcessor::new(HttpBackend::new(GenerationApi::new(
                url.clone(),
            ))))
        }
        None => {
            tracing::warn!(
                stage_delay_ms = config.stage_delay.as_millis() as u64,
                "GENERATION_BACKEND_URL not set; running against dry-run backend",
            );
            Arc::new(StagedProcessor::new(DryRunBackend::new(config.stage_delay)))
        }
    }
}

/// Seed `scheduler` with `submissions`, start processing, and wait until
/// nothing is queued or active.
///
/// Fails if the scheduler was already seeded.
pub async fn run_batch(
    scheduler: &Scheduler,
    submissions: Vec<JobSubmission>,
) -> SchedulerResult<StatusCounts> {
    let mut events = scheduler.subscribe();

    if !scheduler.seed(submissions)? {
        return Err(SchedulerError::Core(
            atelier_core::error::CoreError::Conflict("scheduler already seeded".into()),
        ));
    }
    scheduler.start_processing();

    while scheduler.is_processing() {
        match events.recv().await {
            Ok(event) if event.event_type == EVENT_SCHEDULER_IDLE => break,
            Ok(event) => {
                tracing::trace!(event_type = %event.event_type, job_id = ?event.job_id, "Event");
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Batch runner lagged behind event bus");
            }
            Err(RecvError::Closed) => break,
        }
    }

    Ok(scheduler.counts())
}

/// Parse a JSON array of job submissions.
pub fn parse_submissions(raw: &str) -> Result<Vec<JobSubmission>, serde_json::Error> {
    serde_json::from_str(raw)
}
