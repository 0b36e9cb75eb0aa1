//! Job status tokens and the status classifier.
//!
//! The token strings are part of the external contract: UI labels are keyed
//! off them, so they serialize verbatim in `snake_case`.
//!
//! [`JobStatus::class`] is the only place that decides which statuses count
//! as queued, in flight, or finished. Concurrency accounting and idle
//! detection both go through it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Status classes
// ---------------------------------------------------------------------------

/// Coarse lifecycle bucket a [`JobStatus`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Waiting for a dispatch slot.
    Queued,
    /// Owned by a running processor; counts against the mode's limit.
    Active,
    /// Finished. Never re-dispatched without an explicit retry.
    Terminal,
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Closed set of job status tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Preprocessing,
    Matting,
    Refining,
    RescueQueued,
    Rescuing,
    Completed,
    Failed,
    AnalyzingContext,
    PlacingNeural,
    Decomposing,
    Localizing,
    Vectorizing,
    Refreshing,
    Scripting,
    RenderingVideo,
    VisualizingHooks,
    DraftingContent,
    RenderingVisuals,
}

impl JobStatus {
    /// Every status token, in declaration order.
    pub const ALL: [JobStatus; 19] = [
        JobStatus::Queued,
        JobStatus::Preprocessing,
        JobStatus::Matting,
        JobStatus::Refining,
        JobStatus::RescueQueued,
        JobStatus::Rescuing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::AnalyzingContext,
        JobStatus::PlacingNeural,
        JobStatus::Decomposing,
        JobStatus::Localizing,
        JobStatus::Vectorizing,
        JobStatus::Refreshing,
        JobStatus::Scripting,
        JobStatus::RenderingVideo,
        JobStatus::VisualizingHooks,
        JobStatus::DraftingContent,
        JobStatus::RenderingVisuals,
    ];

    /// Classify this status.
    ///
    /// `queued` is the only queued status; `completed` and `failed` are the
    /// only terminal ones. Everything else is a mode-defined intermediate
    /// state and therefore active.
    pub fn class(self) -> StatusClass {
        match self {
            JobStatus::Queued => StatusClass::Queued,
            JobStatus::Completed | JobStatus::Failed => StatusClass::Terminal,
            JobStatus::Preprocessing
            | JobStatus::Matting
            | JobStatus::Refining
            | JobStatus::RescueQueued
            | JobStatus::Rescuing
            | JobStatus::AnalyzingContext
            | JobStatus::PlacingNeural
            | JobStatus::Decomposing
            | JobStatus::Localizing
            | JobStatus::Vectorizing
            | JobStatus::Refreshing
            | JobStatus::Scripting
            | JobStatus::RenderingVideo
            | JobStatus::VisualizingHooks
            | JobStatus::DraftingContent
            | JobStatus::RenderingVisuals => StatusClass::Active,
        }
    }

    pub fn is_queued(self) -> bool {
        self.class() == StatusClass::Queued
    }

    pub fn is_active(self) -> bool {
        self.class() == StatusClass::Active
    }

    pub fn is_terminal(self) -> bool {
        self.class() == StatusClass::Terminal
    }

    /// The wire token for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Preprocessing => "preprocessing",
            JobStatus::Matting => "matting",
            JobStatus::Refining => "refining",
            JobStatus::RescueQueued => "rescue_queued",
            JobStatus::Rescuing => "rescuing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::AnalyzingContext => "analyzing_context",
            JobStatus::PlacingNeural => "placing_neural",
            JobStatus::Decomposing => "decomposing",
            JobStatus::Localizing => "localizing",
            JobStatus::Vectorizing => "vectorizing",
            JobStatus::Refreshing => "refreshing",
            JobStatus::Scripting => "scripting",
            JobStatus::RenderingVideo => "rendering_video",
            JobStatus::VisualizingHooks => "visualizing_hooks",
            JobStatus::DraftingContent => "drafting_content",
            JobStatus::RenderingVisuals => "rendering_visuals",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job status '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_queued_classifies_as_queued() {
        let queued: Vec<_> = JobStatus::ALL
            .into_iter()
            .filter(|s| s.class() == StatusClass::Queued)
            .collect();
        assert_eq!(queued, vec![JobStatus::Queued]);
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        let terminal: Vec<_> = JobStatus::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![JobStatus::Completed, JobStatus::Failed]);
    }

    #[test]
    fn every_other_status_is_active() {
        let active = JobStatus::ALL.into_iter().filter(|s| s.is_active()).count();
        assert_eq!(active, JobStatus::ALL.len() - 3);
        assert!(JobStatus::RescueQueued.is_active());
        assert!(JobStatus::RenderingVisuals.is_active());
    }

    #[test]
    fn serde_uses_verbatim_tokens() {
        for status in JobStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::Value::String(status.as_str().to_string()));
        }
        assert_eq!(
            serde_json::to_string(&JobStatus::AnalyzingContext).unwrap(),
            "\"analyzing_context\""
        );
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert!("rendering".parse::<JobStatus>().is_err());
        assert!(serde_json::from_str::<JobStatus>("\"paused\"").is_err());
    }

    #[test]
    fn from_str_round_trips_display() {
        assert_eq!(
            "visualizing_hooks".parse::<JobStatus>().unwrap(),
            JobStatus::VisualizingHooks
        );
        assert_eq!(JobStatus::RescueQueued.to_string(), "rescue_queued");
    }
}
