//! Mode dispatcher: the static table mapping each [`Mode`] to its processor,
//! concurrency limit, and per-mode configuration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use atelier_core::mode::{ConcurrencyClass, Mode};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::processor::Processor;

// ---------------------------------------------------------------------------
// ModeConfig
// ---------------------------------------------------------------------------

/// Per-mode settings handed to the processor on every dispatch (model
/// names, quality presets, and similar backend knobs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ModeConfig {
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }
}

// ---------------------------------------------------------------------------
// ModeRoute
// ---------------------------------------------------------------------------

/// Everything the reconciliation loop needs to dispatch a job of one mode.
#[derive(Clone)]
pub struct ModeRoute {
    pub processor: Arc<dyn Processor>,
    /// Maximum number of jobs of this mode in an active status. Always >= 1.
    pub concurrency_limit: usize,
    pub config: ModeConfig,
}

impl fmt::Debug for ModeRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModeRoute")
            .field("concurrency_limit", &self.concurrency_limit)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// ModeDispatcher
// ---------------------------------------------------------------------------

/// Lookup table from mode to [`ModeRoute`]. Built once, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ModeDispatcher {
    routes: HashMap<Mode, ModeRoute>,
}

impl ModeDispatcher {
    pub fn builder(config: &SchedulerConfig) -> ModeDispatcherBuilder {
        ModeDispatcherBuilder {
            config: config.clone(),
            processors: HashMap::new(),
            limits: HashMap::new(),
            mode_configs: HashMap::new(),
        }
    }

    /// Resolve a mode to its processor and limit. `None` when no processor
    /// was registered for the mode.
    pub fn resolve(&self, mode: Mode) -> Option<&ModeRoute> {
        self.routes.get(&mode)
    }

    pub fn concurrency_limit(&self, mode: Mode) -> Option<usize> {
        self.resolve(mode).map(|route| route.concurrency_limit)
    }

    /// Modes that have a processor, in declaration order.
    pub fn modes(&self) -> Vec<Mode> {
        Mode::ALL
            .into_iter()
            .filter(|mode| self.routes.contains_key(mode))
            .collect()
    }
}

/// Builder for [`ModeDispatcher`].
///
/// Limits default to the class limit from [`SchedulerConfig`] and can be
/// overridden per mode with [`with_limit`](Self::with_limit).
pub struct ModeDispatcherBuilder {
    config: SchedulerConfig,
    processors: HashMap<Mode, Arc<dyn Processor>>,
    limits: HashMap<Mode, usize>,
    mode_configs: HashMap<Mode, ModeConfig>,
}

impl ModeDispatcherBuilder {
    pub fn register(mut self, mode: Mode, processor: Arc<dyn Processor>) -> Self {
        self.processors.insert(mode, processor);
        self
    }

    /// Register one processor for every mode.
    pub fn register_all(mut self, processor: Arc<dyn Processor>) -> Self {
        for mode in Mode::ALL {
            self.processors.insert(mode, Arc::clone(&processor));
        }
        self
    }

    /// Override the concurrency limit of one mode. Zero is raised to one.
    pub fn with_limit(mut self, mode: Mode, limit: usize) -> Self {
        self.limits.insert(mode, limit.max(1));
        self
    }

    pub fn with_config(mut self, mode: Mode, config: ModeConfig) -> Self {
        self.mode_configs.insert(mode, config);
        self
    }

    pub fn build(mut self) -> ModeDispatcher {
        let routes = self
            .processors
            .into_iter()
            .map(|(mode, processor)| {
                let concurrency_limit = self
                    .limits
                    .get(&mode)
                    .copied()
                    .unwrap_or_else(|| class_limit(&self.config, mode));
                let config = self.mode_configs.remove(&mode).unwrap_or_default();
                (
                    mode,
                    ModeRoute {
                        processor,
                        concurrency_limit,
                        config,
                    },
                )
            })
            .collect();
        ModeDispatcher { routes }
    }
}

fn class_limit(config: &SchedulerConfig, mode: Mode) -> usize {
    let limit = match mode.concurrency_class() {
        ConcurrencyClass::Default => config.default_concurrency,
        ConcurrencyClass::HighThroughput => config.high_throughput_concurrency,
    };
    limit.max(1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use atelier_core::job::Job;

    use super::*;
    use crate::processor::JobUpdater;

    struct NoopProcessor;

    #[async_trait]
    impl Processor for NoopProcessor {
        async fn process(&self, _job: Job, _config: ModeConfig, _updater: JobUpdater) {}
    }

    fn noop() -> Arc<dyn Processor> {
        Arc::new(NoopProcessor)
    }

    #[test]
    fn limits_follow_concurrency_class() {
        let dispatcher = ModeDispatcher::builder(&SchedulerConfig::default())
            .register_all(noop())
            .build();
        assert_eq!(dispatcher.concurrency_limit(Mode::RemoveBg), Some(3));
        assert_eq!(dispatcher.concurrency_limit(Mode::VideoAd), Some(3));
        assert_eq!(dispatcher.concurrency_limit(Mode::Vectorize), Some(5));
        assert_eq!(dispatcher.concurrency_limit(Mode::Refresh), Some(5));
        assert_eq!(dispatcher.modes().len(), Mode::ALL.len());
    }

    #[test]
    fn per_mode_override_wins() {
        let dispatcher = ModeDispatcher::builder(&SchedulerConfig::default())
            .register(Mode::Upscale, noop())
            .with_limit(Mode::Upscale, 1)
            .build();
        assert_eq!(dispatcher.concurrency_limit(Mode::Upscale), Some(1));
    }

    #[test]
    fn zero_limit_is_raised_to_one() {
        let config = SchedulerConfig {
            default_concurrency: 0,
            ..SchedulerConfig::default()
        };
        let dispatcher = ModeDispatcher::builder(&config)
            .register(Mode::Upscale, noop())
            .register(Mode::Localize, noop())
            .with_limit(Mode::Localize, 0)
            .build();
        assert_eq!(dispatcher.concurrency_limit(Mode::Upscale), Some(1));
        assert_eq!(dispatcher.concurrency_limit(Mode::Localize), Some(1));
    }

    #[test]
    fn unregistered_mode_does_not_resolve() {
        let dispatcher = ModeDispatcher::builder(&SchedulerConfig::default())
            .register(Mode::RemoveBg, noop())
            .build();
        assert!(dispatcher.resolve(Mode::VideoAd).is_none());
        assert_eq!(dispatcher.modes(), vec![Mode::RemoveBg]);
    }

    #[test]
    fn mode_config_is_attached() {
        let dispatcher = ModeDispatcher::builder(&SchedulerConfig::default())
            .register(Mode::VideoAd, noop())
            .with_config(
                Mode::VideoAd,
                ModeConfig::default().with_param("duration_secs", serde_json::json!(15)),
            )
            .build();
        let route = dispatcher.resolve(Mode::VideoAd).unwrap();
        assert_eq!(route.config.get("duration_secs"), Some(&serde_json::json!(15)));
    }
}
