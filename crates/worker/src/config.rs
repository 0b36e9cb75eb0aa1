use std::path::PathBuf;
use std::time::Duration;

use atelier_core::error::CoreError;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Generation backend base URL. `None` runs every job against the
    /// dry-run backend.
    pub backend_url: Option<String>,
    /// Simulated duration of one stage in dry-run mode.
    pub stage_delay: Duration,
    /// JSON file holding the batch of job submissions to run.
    pub jobs_file: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            stage_delay: Duration::from_millis(250),
            jobs_file: PathBuf::from("jobs.json"),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default     |
    /// |--------------------------|-------------|
    /// | `GENERATION_BACKEND_URL` | unset       |
    /// | `WORKER_STAGE_DELAY_MS`  | `250`       |
    /// | `WORKER_JOBS_FILE`       | `jobs.json` |
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();

        let backend_url = std::env::var("GENERATION_BACKEND_URL")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let stage_delay = match std::env::var("WORKER_STAGE_DELAY_MS") {
            Ok(raw) => Duration::from_millis(parse_millis(&raw)?),
            Err(_) => defaults.stage_delay,
        };

        let jobs_file = std::env::var("WORKER_JOBS_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.jobs_file);

        Ok(Self {
            backend_url,
            stage_delay,
            jobs_file,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.backend_url.is_none()
    }
}

fn parse_millis(raw: &str) -> Result<u64, CoreError> {
    raw.trim().parse().map_err(|_| {
        CoreError::Validation(format!(
            "WORKER_STAGE_DELAY_MS must be a non-negative integer, got '{raw}'"
        ))
    })
}
