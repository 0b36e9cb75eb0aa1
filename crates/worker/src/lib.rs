//! Atelier worker: processors backed by a generation service, plus the
//! batch runner used by the `atelier-worker` binary.

pub mod api;
pub mod backend;
pub mod config;
pub mod processor;
pub mod runner;

pub use backend::{DryRunBackend, HttpBackend, StageBackend, StageCall};
pub use config::WorkerConfig;
pub use processor::StagedProcessor;
