//! Job records, submissions, partial updates, and per-mode outputs.
//!
//! A [`Job`]'s result payload is a [`JobOutput`] tagged by mode, so a
//! `remove-bg` job can only ever carry a cutout and a `refresh` job can only
//! ever carry variants. The scheduler never looks inside an output; it only
//! checks that the tag matches the job's mode before merging.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::mode::Mode;
use crate::status::JobStatus;
use crate::types::{new_job_id, JobId, Timestamp};

/// Upper bound for [`Job::progress`].
pub const MAX_PROGRESS: u8 = 100;

/// URI scheme used for synthesized placeholder assets.
pub const PLACEHOLDER_SCHEME: &str = "placeholder://";

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Reference to an asset stored outside the scheduler (URL or path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl AssetRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Stand-in input for modes that generate from text alone.
    pub fn placeholder(mode: Mode) -> Self {
        Self::new(format!("{PLACEHOLDER_SCHEME}{mode}"))
    }

    pub fn is_placeholder(&self) -> bool {
        self.uri.starts_with(PLACEHOLDER_SCHEME)
    }
}

/// One marketing hook produced by `hook-visualizer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hook {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<AssetRef>,
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Result payload, one variant per [`Mode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum JobOutput {
    RemoveBg {
        cutout: AssetRef,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mask: Option<AssetRef>,
    },
    Upscale {
        image: AssetRef,
    },
    StyleTransfer {
        image: AssetRef,
    },
    ProductPlacement {
        image: AssetRef,
    },
    LayerDecompose {
        layers: Vec<AssetRef>,
    },
    Localize {
        image: AssetRef,
        locale: String,
    },
    Vectorize {
        svg: AssetRef,
    },
    Refresh {
        variants: Vec<AssetRef>,
        #[serde(default)]
        selected: Option<usize>,
    },
    TextScript {
        script: String,
    },
    VideoAd {
        script: String,
        video: AssetRef,
    },
    HookVisualizer {
        hooks: Vec<Hook>,
        #[serde(default)]
        selected: Option<usize>,
    },
    SocialContent {
        copy: String,
        visuals: Vec<AssetRef>,
    },
}

/// Why an index into an output's items could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutputIndexError {
    #[error("output has no indexable items")]
    NotIndexable,
    #[error("index {index} out of range for {len} items")]
    OutOfRange { index: usize, len: usize },
}

impl JobOutput {
    pub fn mode(&self) -> Mode {
        match self {
            JobOutput::RemoveBg { .. } => Mode::RemoveBg,
            JobOutput::Upscale { .. } => Mode::Upscale,
            JobOutput::StyleTransfer { .. } => Mode::StyleTransfer,
            JobOutput::ProductPlacement { .. } => Mode::ProductPlacement,
            JobOutput::LayerDecompose { .. } => Mode::LayerDecompose,
            JobOutput::Localize { .. } => Mode::Localize,
            JobOutput::Vectorize { .. } => Mode::Vectorize,
            JobOutput::Refresh { .. } => Mode::Refresh,
            JobOutput::TextScript { .. } => Mode::TextScript,
            JobOutput::VideoAd { .. } => Mode::VideoAd,
            JobOutput::HookVisualizer { .. } => Mode::HookVisualizer,
            JobOutput::SocialContent { .. } => Mode::SocialContent,
        }
    }

    /// Currently chosen variant or hook, for outputs that offer a choice.
    pub fn selected(&self) -> Option<usize> {
        match self {
            JobOutput::Refresh { selected, .. } | JobOutput::HookVisualizer { selected, .. } => {
                *selected
            }
            _ => None,
        }
    }

    /// Choose one of several generated variants (or hooks).
    pub fn select(&mut self, index: usize) -> Result<(), OutputIndexError> {
        let (len, selected) = match self {
            JobOutput::Refresh { variants, selected } => (variants.len(), selected),
            JobOutput::HookVisualizer { hooks, selected } => (hooks.len(), selected),
            _ => return Err(OutputIndexError::NotIndexable),
        };
        if index >= len {
            return Err(OutputIndexError::OutOfRange { index, len });
        }
        *selected = Some(index);
        Ok(())
    }

    /// Number of individually regenerable sub-assets, if any.
    pub fn asset_count(&self) -> Option<usize> {
        match self {
            JobOutput::LayerDecompose { layers } => Some(layers.len()),
            JobOutput::Refresh { variants, .. } => Some(variants.len()),
            JobOutput::HookVisualizer { hooks, .. } => Some(hooks.len()),
            JobOutput::SocialContent { visuals, .. } => Some(visuals.len()),
            _ => None,
        }
    }

    /// Sub-asset at `index`. Hooks without a rendered preview yield `None`.
    pub fn asset(&self, index: usize) -> Option<&AssetRef> {
        match self {
            JobOutput::LayerDecompose { layers } => layers.get(index),
            JobOutput::Refresh { variants, .. } => variants.get(index),
            JobOutput::HookVisualizer { hooks, .. } => {
                hooks.get(index).and_then(|h| h.preview.as_ref())
            }
            JobOutput::SocialContent { visuals, .. } => visuals.get(index),
            _ => None,
        }
    }

    /// Replace one sub-asset, leaving the rest of the output untouched.
    pub fn replace_asset(&mut self, index: usize, asset: AssetRef) -> Result<(), OutputIndexError> {
        let len = self.asset_count().ok_or(OutputIndexError::NotIndexable)?;
        if index >= len {
            return Err(OutputIndexError::OutOfRange { index, len });
        }
        match self {
            JobOutput::LayerDecompose { layers: items }
            | JobOutput::Refresh {
                variants: items, ..
            }
            | JobOutput::SocialContent { visuals: items, .. } => items[index] = asset,
            JobOutput::HookVisualizer { hooks, .. } => hooks[index].preview = Some(asset),
            _ => return Err(OutputIndexError::NotIndexable),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Fields merged into a job alongside a status change.
///
/// `None` means "leave as is"; there is no way to clear a field through a
/// patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPatch {
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub progress_message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub output: Option<JobOutput>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.progress_message = Some(message.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn output(mut self, output: JobOutput) -> Self {
        self.output = Some(output);
        self
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Caller-facing request to create a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub mode: Mode,
    #[serde(default)]
    pub asset: Option<AssetRef>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    /// Defaults to `queued`. Synthetic or imported jobs may start terminal.
    #[serde(default)]
    pub initial_status: Option<JobStatus>,
    /// Pre-existing result for jobs imported as `completed`.
    #[serde(default)]
    pub output: Option<JobOutput>,
}

impl JobSubmission {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            asset: None,
            params: None,
            initial_status: None,
            output: None,
        }
    }

    pub fn with_asset(mut self, asset: AssetRef) -> Self {
        self.asset = Some(asset);
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_initial_status(mut self, status: JobStatus) -> Self {
        self.initial_status = Some(status);
        self
    }

    pub fn with_output(mut self, output: JobOutput) -> Self {
        self.output = Some(output);
        self
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// The unit of work owned by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub mode: Mode,
    pub status: JobStatus,
    pub asset: AssetRef,
    /// Opaque request parameters forwarded to the processor.
    pub params: serde_json::Value,
    pub progress: Option<u8>,
    pub progress_message: Option<String>,
    /// Only ever set while `status == failed`.
    pub error: Option<String>,
    pub output: Option<JobOutput>,
    /// How many times the scheduler has dispatched this job.
    pub attempts: u32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// Build a new job from a submission, assigning a fresh id.
    ///
    /// Rejects submissions that would start in an active status (they would
    /// bypass the concurrency limit), outputs tagged with another mode, and
    /// missing assets for modes that need one.
    pub fn from_submission(submission: JobSubmission) -> Result<Self, CoreError> {
        let JobSubmission {
            mode,
            asset,
            params,
            initial_status,
            output,
        } = submission;

        let status = initial_status.unwrap_or(JobStatus::Queued);
        if status.is_active() {
            return Err(CoreError::Validation(format!(
                "Jobs cannot be created in active status '{status}'"
            )));
        }

        if let Some(ref output) = output {
            if output.mode() != mode {
                return Err(CoreError::Validation(format!(
                    "Output for mode '{}' does not match job mode '{mode}'",
                    output.mode()
                )));
            }
        }

        let asset = match asset {
            Some(asset) => asset,
            None if mode.requires_asset() => {
                return Err(CoreError::Validation(format!(
                    "Mode '{mode}' requires an input asset"
                )));
            }
            None => AssetRef::placeholder(mode),
        };

        let now = chrono::Utc::now();
        Ok(Self {
            id: new_job_id(),
            mode,
            status,
            asset,
            params: params.unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            progress: None,
            progress_message: None,
            error: None,
            output,
            attempts: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Merge a status change and a patch into this job.
    ///
    /// Unspecified patch fields are left untouched. Progress is clamped to
    /// [`MAX_PROGRESS`]. The error field is dropped whenever the new status
    /// is not `failed`.
    pub fn apply(&mut self, status: JobStatus, patch: JobPatch) {
        self.status = status;
        if let Some(progress) = patch.progress {
            self.progress = Some(progress.min(MAX_PROGRESS));
        }
        if let Some(message) = patch.progress_message {
            self.progress_message = Some(message);
        }
        if status == JobStatus::Failed {
            if let Some(error) = patch.error {
                self.error = Some(error);
            }
        } else {
            self.error = None;
        }
        if let Some(output) = patch.output {
            self.output = Some(output);
        }
        self.updated_at = chrono::Utc::now();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn queued(mode: Mode) -> Job {
        Job::from_submission(JobSubmission::new(mode).with_asset(AssetRef::new("s3://in.png")))
            .unwrap()
    }

    // -- from_submission ------------------------------------------------------

    #[test]
    fn submission_defaults_to_queued() {
        let job = queued(Mode::RemoveBg);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.attempts, 0);
        assert!(job.params.is_object());
    }

    #[test]
    fn active_initial_status_is_rejected() {
        let sub = JobSubmission::new(Mode::Upscale)
            .with_asset(AssetRef::new("a.png"))
            .with_initial_status(JobStatus::Refining);
        assert_matches!(Job::from_submission(sub), Err(CoreError::Validation(_)));
    }

    #[test]
    fn terminal_initial_status_is_accepted() {
        let sub = JobSubmission::new(Mode::TextScript)
            .with_initial_status(JobStatus::Completed)
            .with_output(JobOutput::TextScript {
                script: "Open on a beach.".into(),
            });
        let job = Job::from_submission(sub).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.output.is_some());
    }

    #[test]
    fn text_mode_gets_placeholder_asset() {
        let job = Job::from_submission(JobSubmission::new(Mode::SocialContent)).unwrap();
        assert!(job.asset.is_placeholder());
        assert_eq!(job.asset.uri, "placeholder://social-content");
    }

    #[test]
    fn image_mode_without_asset_is_rejected() {
        let result = Job::from_submission(JobSubmission::new(Mode::RemoveBg));
        assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("remove-bg"));
    }

    #[test]
    fn mismatched_output_is_rejected() {
        let sub = JobSubmission::new(Mode::Vectorize)
            .with_asset(AssetRef::new("logo.png"))
            .with_initial_status(JobStatus::Completed)
            .with_output(JobOutput::Upscale {
                image: AssetRef::new("big.png"),
            });
        assert_matches!(Job::from_submission(sub), Err(CoreError::Validation(_)));
    }

    // -- apply ----------------------------------------------------------------

    #[test]
    fn apply_keeps_unspecified_fields() {
        let mut job = queued(Mode::RemoveBg);
        job.apply(JobStatus::Matting, JobPatch::new().progress(30));
        job.apply(JobStatus::Refining, JobPatch::new().message("Refining edges"));
        assert_eq!(job.status, JobStatus::Refining);
        assert_eq!(job.progress, Some(30));
        assert_eq!(job.progress_message.as_deref(), Some("Refining edges"));
    }

    #[test]
    fn apply_clamps_progress() {
        let mut job = queued(Mode::Upscale);
        job.apply(JobStatus::Refining, JobPatch::new().progress(250));
        assert_eq!(job.progress, Some(MAX_PROGRESS));
    }

    #[test]
    fn error_only_survives_on_failed() {
        let mut job = queued(Mode::Upscale);
        job.apply(JobStatus::Refining, JobPatch::new().error("ignored"));
        assert_eq!(job.error, None);

        job.apply(JobStatus::Failed, JobPatch::new().error("backend timeout"));
        assert_eq!(job.error.as_deref(), Some("backend timeout"));

        job.apply(JobStatus::Queued, JobPatch::new());
        assert_eq!(job.error, None);
    }

    // -- outputs --------------------------------------------------------------

    #[test]
    fn output_serializes_with_mode_tag() {
        let output = JobOutput::Vectorize {
            svg: AssetRef::new("logo.svg"),
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["mode"], "vectorize");
        assert_eq!(json["svg"]["uri"], "logo.svg");
    }

    #[test]
    fn select_variant_in_range() {
        let mut output = JobOutput::Refresh {
            variants: vec![AssetRef::new("a"), AssetRef::new("b")],
            selected: None,
        };
        output.select(1).unwrap();
        assert_eq!(output.selected(), Some(1));
        assert_eq!(
            output.select(2),
            Err(OutputIndexError::OutOfRange { index: 2, len: 2 })
        );
    }

    #[test]
    fn select_on_single_asset_output_fails() {
        let mut output = JobOutput::Upscale {
            image: AssetRef::new("x"),
        };
        assert_eq!(output.select(0), Err(OutputIndexError::NotIndexable));
    }

    #[test]
    fn replace_hook_preview() {
        let mut output = JobOutput::HookVisualizer {
            hooks: vec![Hook {
                text: "Stop scrolling".into(),
                preview: None,
            }],
            selected: Some(0),
        };
        assert_eq!(output.asset(0), None);
        output.replace_asset(0, AssetRef::new("hook0.png")).unwrap();
        assert_eq!(output.asset(0), Some(&AssetRef::new("hook0.png")));
        assert_eq!(output.selected(), Some(0));
    }

    #[test]
    fn replace_layer_leaves_others() {
        let mut output = JobOutput::LayerDecompose {
            layers: vec![AssetRef::new("bg"), AssetRef::new("fg")],
        };
        output.replace_asset(0, AssetRef::new("bg-v2")).unwrap();
        assert_eq!(output.asset(0).unwrap().uri, "bg-v2");
        assert_eq!(output.asset(1).unwrap().uri, "fg");
    }
}
