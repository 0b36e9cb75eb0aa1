//! Processing modes.
//!
//! A mode picks the processor that runs a job and the concurrency bucket the
//! job is counted in. Modes serialize as kebab-case identifiers
//! (`remove-bg`, `video-ad`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::status::JobStatus;

// ---------------------------------------------------------------------------
// Concurrency classes
// ---------------------------------------------------------------------------

/// Which concurrency limit a mode draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyClass {
    /// Shared default limit.
    Default,
    /// Lightweight modes that tolerate more in-flight requests.
    HighThroughput,
}

/// Default in-flight limit for most modes.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// In-flight limit for [`ConcurrencyClass::HighThroughput`] modes.
pub const HIGH_THROUGHPUT_CONCURRENCY: usize = 5;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    RemoveBg,
    Upscale,
    StyleTransfer,
    ProductPlacement,
    LayerDecompose,
    Localize,
    Vectorize,
    Refresh,
    TextScript,
    VideoAd,
    HookVisualizer,
    SocialContent,
}

impl Mode {
    pub const ALL: [Mode; 12] = [
        Mode::RemoveBg,
        Mode::Upscale,
        Mode::StyleTransfer,
        Mode::ProductPlacement,
        Mode::LayerDecompose,
        Mode::Localize,
        Mode::Vectorize,
        Mode::Refresh,
        Mode::TextScript,
        Mode::VideoAd,
        Mode::HookVisualizer,
        Mode::SocialContent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::RemoveBg => "remove-bg",
            Mode::Upscale => "upscale",
            Mode::StyleTransfer => "style-transfer",
            Mode::ProductPlacement => "product-placement",
            Mode::LayerDecompose => "layer-decompose",
            Mode::Localize => "localize",
            Mode::Vectorize => "vectorize",
            Mode::Refresh => "refresh",
            Mode::TextScript => "text-script",
            Mode::VideoAd => "video-ad",
            Mode::HookVisualizer => "hook-visualizer",
            Mode::SocialContent => "social-content",
        }
    }

    pub fn concurrency_class(self) -> ConcurrencyClass {
        match self {
            Mode::Vectorize | Mode::Localize | Mode::Refresh => ConcurrencyClass::HighThroughput,
            _ => ConcurrencyClass::Default,
        }
    }

    /// Ordered intermediate statuses a processor walks through after the
    /// scheduler has marked the job `preprocessing`.
    ///
    /// `remove-bg` may additionally detour through `rescue_queued` and
    /// `rescuing` when the first matte is unusable; that path is processor
    /// specific and not part of the nominal stage list.
    pub fn stages(self) -> &'static [JobStatus] {
        match self {
            Mode::RemoveBg => &[JobStatus::Matting, JobStatus::Refining],
            Mode::Upscale => &[JobStatus::Refining],
            Mode::StyleTransfer => &[JobStatus::AnalyzingContext, JobStatus::Refining],
            Mode::ProductPlacement => &[JobStatus::AnalyzingContext, JobStatus::PlacingNeural],
            Mode::LayerDecompose => &[JobStatus::Decomposing],
            Mode::Localize => &[JobStatus::AnalyzingContext, JobStatus::Localizing],
            Mode::Vectorize => &[JobStatus::Vectorizing],
            Mode::Refresh => &[JobStatus::Refreshing],
            Mode::TextScript => &[JobStatus::Scripting],
            Mode::VideoAd => &[JobStatus::Scripting, JobStatus::RenderingVideo],
            Mode::HookVisualizer => &[JobStatus::Scripting, JobStatus::VisualizingHooks],
            Mode::SocialContent => &[JobStatus::DraftingContent, JobStatus::RenderingVisuals],
        }
    }

    /// Whether jobs of this mode start from a caller-supplied input asset.
    ///
    /// Text-first modes get a synthesized placeholder asset instead.
    pub fn requires_asset(self) -> bool {
        !matches!(
            self,
            Mode::TextScript | Mode::HookVisualizer | Mode::SocialContent
        )
    }

    /// Transient status shown while a single sub-asset is regenerated, for
    /// modes whose output carries an indexable asset list.
    pub fn regenerate_status(self) -> Option<JobStatus> {
        match self {
            Mode::LayerDecompose => Some(JobStatus::Decomposing),
            Mode::Refresh => Some(JobStatus::Refreshing),
            Mode::HookVisualizer => Some(JobStatus::VisualizingHooks),
            Mode::SocialContent => Some(JobStatus::RenderingVisuals),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown mode '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
