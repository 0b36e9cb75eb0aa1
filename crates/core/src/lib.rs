//! Atelier domain types.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! scheduler, the worker processors, the event bus, and the HTTP API.
//!
//! - [`status`]: the closed job status set and its classifier.
//! - [`mode`]: processing modes, their stages and concurrency classes.
//! - [`job`]: the job record, submissions, patches, and per-mode outputs.
//! - [`job_events`]: event type names published on the event bus.

pub mod error;
pub mod job;
pub mod job_events;
pub mod mode;
pub mod status;
pub mod types;
