//! Atelier job event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`]: the lifecycle event envelope published by the
//!   scheduler and streamed to WebSocket clients.

pub mod bus;

pub use bus::{EventBus, JobEvent};
