//! Job lifecycle notifications.
//!
//! The scheduler publishes a [`JobEvent`] for every change it makes; the
//! WebSocket endpoint and the batch runner subscribe. Delivery is
//! best-effort: a receiver that falls more than the channel capacity behind
//! loses the oldest events and sees `RecvError::Lagged`.

use atelier_core::job::Job;
use atelier_core::mode::Mode;
use atelier_core::status::JobStatus;
use atelier_core::types::{JobId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A job lifecycle event.
///
/// Constructed via [`JobEvent::new`] and enriched with
/// [`for_job`](JobEvent::for_job) and
/// [`with_payload`](JobEvent::with_payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Dot-separated event name, e.g. `"job.completed"`.
    pub event_type: String,

    pub job_id: Option<JobId>,
    pub mode: Option<Mode>,
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub progress_message: Option<String>,
    pub error: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: Timestamp,
}

impl JobEvent {
    /// Event with no job attached and an empty object payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            job_id: None,
            mode: None,
            status: None,
            progress: None,
            progress_message: None,
            error: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Copy the job's identity and display fields into the event.
    pub fn for_job(mut self, job: &Job) -> Self {
        self.job_id = Some(job.id);
        self.mode = Some(job.mode);
        self.status = Some(job.status);
        self.progress = job.progress;
        self.progress_message = job.progress_message.clone();
        self.error = job.error.clone();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per receiver before the oldest are overwritten.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast hub shared as `Arc<EventBus>` between the scheduler and its
/// observers.
///
/// ```rust
/// use atelier_events::bus::{EventBus, JobEvent};
///
/// let bus = EventBus::new(16);
/// let mut events = bus.subscribe();
/// bus.publish(JobEvent::new("scheduler.idle"));
/// assert_eq!(events.try_recv().unwrap().event_type, "scheduler.idle");
/// ```
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fan `event` out to every live receiver. Events published while
    /// nobody is subscribed are dropped.
    pub fn publish(&self, event: JobEvent) {
        tracing::trace!(event_type = %event.event_type, job_id = ?event.job_id, "Publishing event");
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for event");
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
