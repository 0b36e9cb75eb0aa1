//! Stage backends: where a [`StagedProcessor`](crate::processor::StagedProcessor)
//! sends each stage of a job.

use std::time::Duration;

use async_trait::async_trait;
use atelier_core::job::{AssetRef, Hook, Job, JobOutput};
use atelier_core::mode::Mode;
use atelier_core::status::JobStatus;
use atelier_scheduler::{ModeConfig, ProcessorError};

use crate::api::{GenerationApi, RegenerateRequest, StageRequest};

/// One stage of one job, as handed to a [`StageBackend`].
#[derive(Debug, Clone, Copy)]
pub struct StageCall<'a> {
    pub job: &'a Job,
    pub config: &'a ModeConfig,
    pub stage: JobStatus,
    /// Zero-based position of `stage` in the mode's stage list.
    pub position: usize,
    pub total: usize,
    pub previous: Option<&'a serde_json::Value>,
}

impl StageCall<'_> {
    pub fn is_final(&self) -> bool {
        self.position + 1 == self.total
    }
}

#[async_trait]
pub trait StageBackend: Send + Sync {
    /// Run one stage. The final stage's response must describe the job's
    /// [`JobOutput`] (with or without the `mode` tag).
    async fn run_stage(&self, call: StageCall<'_>) -> Result<serde_json::Value, ProcessorError>;

    async fn regenerate(
        &self,
        job: &Job,
        index: usize,
        config: &ModeConfig,
    ) -> Result<AssetRef, ProcessorError>;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Forwards every stage to a remote generation backend.
pub struct HttpBackend {
    api: GenerationApi,
}

impl HttpBackend {
    pub fn new(api: GenerationApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl StageBackend for HttpBackend {
    async fn run_stage(&self, call: StageCall<'_>) -> Result<serde_json::Value, ProcessorError> {
        let request = StageRequest {
            job_id: call.job.id,
            asset: &call.job.asset,
            params: &call.job.params,
            config: &call.config.params,
            previous: call.previous,
        };
        self.api
            .run_stage(call.job.mode, call.stage, &request)
            .await
            .map_err(|e| ProcessorError::Backend(e.to_string()))
    }

    async fn regenerate(
        &self,
        job: &Job,
        index: usize,
        config: &ModeConfig,
    ) -> Result<AssetRef, ProcessorError> {
        let request = RegenerateRequest {
            job_id: job.id,
            asset: &job.asset,
            params: &job.params,
            config: &config.params,
            output: job.output.as_ref(),
            index,
        };
        self.api
            .regenerate(job, &request)
            .await
            .map_err(|e| ProcessorError::Backend(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Params key that makes a dry-run job fail at its final stage with the
/// given message.
pub const SIMULATE_FAILURE_PARAM: &str = "simulate_failure";

/// Backend that sleeps for each stage and fabricates plausible outputs.
/// Used when no generation backend URL is configured.
#[derive(Debug, Clone)]
pub struct DryRunBackend {
    stage_delay: Duration,
}

impl DryRunBackend {
    pub fn new(stage_delay: Duration) -> Self {
        Self { stage_delay }
    }
}

#[async_trait]
impl StageBackend for DryRunBackend {
    async fn run_stage(&self, call: StageCall<'_>) -> Result<serde_json::Value, ProcessorError> {
        tokio::time::sleep(self.stage_delay).await;

        if !call.is_final() {
            return Ok(serde_json::json!({ "stage": call.stage }));
        }
        if let Some(message) = call
            .job
            .params
            .get(SIMULATE_FAILURE_PARAM)
            .and_then(|v| v.as_str())
        {
            return Err(ProcessorError::Backend(message.to_string()));
        }

        serde_json::to_value(dry_run_output(call.job))
            .map_err(|e| ProcessorError::InvalidOutput(e.to_string()))
    }

    async fn regenerate(
        &self,
        job: &Job,
        index: usize,
        _config: &ModeConfig,
    ) -> Result<AssetRef, ProcessorError> {
        tokio::time::sleep(self.stage_delay).await;
        Ok(dry_run_asset(job, &format!("regenerated-{index}.png")))
    }
}

fn dry_run_asset(job: &Job, name: &str) -> AssetRef {
    AssetRef::new(format!("dry-run://{}/{name}", job.id))
}

fn dry_run_assets(job: &Job, prefix: &str, count: usize) -> Vec<AssetRef> {
    (0..count)
        .map(|i| dry_run_asset(job, &format!("{prefix}-{i}.png")))
        .collect()
}

fn param_str<'a>(job: &'a Job, key: &str) -> Option<&'a str> {
    job.params.get(key).and_then(|v| v.as_str())
}

/// A placeholder output of the right shape for `job.mode`.
pub fn dry_run_output(job: &Job) -> JobOutput {
    let prompt = param_str(job, "prompt").unwrap_or("untitled campaign");
    match job.mode {
        Mode::RemoveBg => JobOutput::RemoveBg {
            cutout: dry_run_asset(job, "cutout.png"),
            mask: Some(dry_run_asset(job, "mask.png")),
        },
        Mode::Upscale => JobOutput::Upscale {
            image: dry_run_asset(job, "upscaled.png"),
        },
        Mode::StyleTransfer => JobOutput::StyleTransfer {
            image: dry_run_asset(job, "styled.png"),
        },
        Mode::ProductPlacement => JobOutput::ProductPlacement {
            image: dry_run_asset(job, "placed.png"),
        },
        Mode::LayerDecompose => JobOutput::LayerDecompose {
            layers: dry_run_assets(job, "layer", 3),
        },
        Mode::Localize => JobOutput::Localize {
            image: dry_run_asset(job, "localized.png"),
            locale: param_str(job, "locale").unwrap_or("en-US").to_string(),
        },
        Mode::Vectorize => JobOutput::Vectorize {
            svg: dry_run_asset(job, "vector.svg").with_mime_type("image/svg+xml"),
        },
        Mode::Refresh => JobOutput::Refresh {
            variants: dry_run_assets(job, "variant", 4),
            selected: None,
        },
        Mode::TextScript => JobOutput::TextScript {
            script: format!("Script draft for \"{prompt}\""),
        },
        Mode::VideoAd => JobOutput::VideoAd {
            script: format!("Storyboard for \"{prompt}\""),
            video: dry_run_asset(job, "ad.mp4").with_mime_type("video/mp4"),
        },
        Mode::HookVisualizer => JobOutput::HookVisualizer {
            hooks: (0..3)
                .map(|i| Hook {
                    text: format!("Hook {} for \"{prompt}\"", i + 1),
                    preview: Some(dry_run_asset(job, &format!("hook-{i}.png"))),
                })
                .collect(),
            selected: None,
        },
        Mode::SocialContent => JobOutput::SocialContent {
            copy: format!("Post copy for \"{prompt}\""),
            visuals: dry_run_assets(job, "visual", 2),
        },
    }
}
