//! Generic multi-stage processor.
//!
//! Walks a job through its mode's stage statuses in order, reporting each
//! stage before running it, and finishes with exactly one terminal update.

use async_trait::async_trait;
use atelier_core::job::{AssetRef, Job, JobOutput};
use atelier_core::mode::Mode;
use atelier_core::status::JobStatus;
use atelier_scheduler::{JobUpdater, ModeConfig, Processor, ProcessorError};

use crate::backend::{StageBackend, StageCall};

pub struct StagedProcessor<B> {
    backend: B,
}

impl<B: StageBackend> StagedProcessor<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    async fn run(&self, job: &Job, config: &ModeConfig, updater: &JobUpdater) -> Outcome {
        let stages = job.mode.stages();
        let total = stages.len();
        let mut previous: Option<serde_json::Value> = None;

        for (position, &stage) in stages.iter().enumerate() {
            let percent = stage_percent(position, total);
            let message = format!("{} ({}/{})", stage_label(stage), position + 1, total);
            if updater.progress(job.id, stage, percent, message).is_err() {
                // Removed or taken over while we were running.
                return Outcome::Abandoned;
            }

            let call = StageCall {
                job,
                config,
                stage,
                position,
                total,
                previous: previous.as_ref(),
            };
            match self.backend.run_stage(call).await {
                Ok(response) => previous = Some(response),
                Err(e) => return Outcome::Failed(format!("{} failed: {e}", stage_label(stage))),
            }
        }

        let Some(response) = previous else {
            return Outcome::Failed(format!("mode {} has no stages", job.mode));
        };
        match parse_output(job.mode, response) {
            Ok(output) => Outcome::Completed(output),
            Err(e) => Outcome::Failed(e.to_string()),
        }
    }
}

enum Outcome {
    Completed(JobOutput),
    Failed(String),
    Abandoned,
}

#[async_trait]
impl<B: StageBackend> Processor for StagedProcessor<B> {
    async fn process(&self, job: Job, config: ModeConfig, updater: JobUpdater) {
        let result = match self.run(&job, &config, &updater).await {
            Outcome::Completed(output) => updater.complete(job.id, output),
            Outcome::Failed(error) => {
                tracing::warn!(job_id = %job.id, mode = %job.mode, %error, "Processing failed");
                updater.fail(job.id, error)
            }
            Outcome::Abandoned => {
                tracing::debug!(job_id = %job.id, "Job no longer accepts updates; stopping");
                return;
            }
        };
        if let Err(e) = result {
            tracing::debug!(job_id = %job.id, error = %e, "Final update rejected");
        }
    }

    async fn regenerate(
        &self,
        job: &Job,
        index: usize,
        config: &ModeConfig,
    ) -> Result<AssetRef, ProcessorError> {
        self.backend.regenerate(job, index, config).await
    }
}

/// Progress reported when entering the stage at `position`.
fn stage_percent(position: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((position * 100) / total).min(99) as u8
}

fn stage_label(stage: JobStatus) -> &'static str {
    match stage {
        JobStatus::Matting => "Extracting subject",
        JobStatus::Refining => "Refining",
        JobStatus::AnalyzingContext => "Analyzing context",
        JobStatus::PlacingNeural => "Placing product",
        JobStatus::Decomposing => "Splitting layers",
        JobStatus::Localizing => "Localizing",
        JobStatus::Vectorizing => "Tracing vectors",
        JobStatus::Refreshing => "Generating variants",
        JobStatus::Scripting => "Writing script",
        JobStatus::RenderingVideo => "Rendering video",
        JobStatus::VisualizingHooks => "Visualizing hooks",
        JobStatus::DraftingContent => "Drafting copy",
        JobStatus::RenderingVisuals => "Rendering visuals",
        other => other.as_str(),
    }
}

/// Decode the final stage's response as a [`JobOutput`] of `mode`.
///
/// Backends may omit the `mode` tag; it is filled in from the job.
pub fn parse_output(mode: Mode, response: serde_json::Value) -> Result<JobOutput, ProcessorError> {
    let mut response = response;
    if let serde_json::Value::Object(ref mut fields) = response {
        fields
            .entry("mode")
            .or_insert_with(|| serde_json::Value::String(mode.as_str().to_string()));
    }

    let output: JobOutput = serde_json::from_value(response)
        .map_err(|e| ProcessorError::InvalidOutput(e.to_string()))?;
    if output.mode() != mode {
        return Err(ProcessorError::InvalidOutput(format!(
            "backend returned {} output for a {mode} job",
            output.mode()
        )));
    }
    Ok(output)
}
