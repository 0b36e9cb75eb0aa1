use atelier_core::error::CoreError;
use atelier_core::mode::{DEFAULT_CONCURRENCY, HIGH_THROUGHPUT_CONCURRENCY};
use atelier_events::bus::DEFAULT_CAPACITY;

/// Scheduler configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// In-flight limit shared by most modes.
    pub default_concurrency: usize,
    /// In-flight limit for high-throughput modes (`vectorize`, `localize`, `refresh`).
    pub high_throughput_concurrency: usize,
    /// Broadcast buffer size for the job event bus.
    pub event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: DEFAULT_CONCURRENCY,
            high_throughput_concurrency: HIGH_THROUGHPUT_CONCURRENCY,
            event_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                                 | Default |
    /// |-----------------------------------------|---------|
    /// | `SCHEDULER_DEFAULT_CONCURRENCY`         | `3`     |
    /// | `SCHEDULER_HIGH_THROUGHPUT_CONCURRENCY` | `5`     |
    /// | `SCHEDULER_EVENT_CAPACITY`              | `1024`  |
    ///
    /// Limits must be at least 1.
    pub fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();
        Ok(Self {
            default_concurrency: positive_env(
                "SCHEDULER_DEFAULT_CONCURRENCY",
                defaults.default_concurrency,
            )?,
            high_throughput_concurrency: positive_env(
                "SCHEDULER_HIGH_THROUGHPUT_CONCURRENCY",
                defaults.high_throughput_concurrency,
            )?,
            event_capacity: positive_env("SCHEDULER_EVENT_CAPACITY", defaults.event_capacity)?,
        })
    }
}

fn positive_env(key: &str, default: usize) -> Result<usize, CoreError> {
    match std::env::var(key) {
        Ok(raw) => parse_positive(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, CoreError> {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(CoreError::Validation(format!(
            "{key} must be a positive integer, got '{raw}'"
        ))),
        Ok(value) => Ok(value),
    }
}
