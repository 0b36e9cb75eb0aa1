//! Atelier job scheduler.
//!
//! Holds every generation job in an insertion-ordered registry and keeps
//! them moving:
//!
//! - [`ModeDispatcher`] maps each mode to its [`Processor`] and per-mode
//!   concurrency limit.
//! - [`Scheduler`] runs the reconciliation loop that dispatches queued jobs
//!   while respecting those limits, and exposes the job collection plus the
//!   retry / select / regenerate mutations.
//! - [`JobUpdater`] is the handle processors report progress through.

pub mod config;
pub mod dispatcher;
pub mod error;
mod mutations;
pub mod processor;
pub mod registry;
pub mod scheduler;

pub use config::SchedulerConfig;
pub use dispatcher::{ModeConfig, ModeDispatcher, ModeDispatcherBuilder, ModeRoute};
pub use error::{SchedulerError, SchedulerResult};
pub use processor::{JobUpdater, Processor, ProcessorError};
pub use registry::{JobRegistry, StatusCounts};
pub use scheduler::Scheduler;
