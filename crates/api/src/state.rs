use atelier_scheduler::Scheduler;
use tokio_util::sync::CancellationToken;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: both fields are shared handles.
#[derive(Clone)]
pub struct AppState {
    /// The job scheduler every handler operates on.
    pub scheduler: Scheduler,
    /// Cancelled when the server begins shutting down; long-lived
    /// connections (WebSocket streams) watch it to close cleanly.
    pub shutdown: CancellationToken,
}
