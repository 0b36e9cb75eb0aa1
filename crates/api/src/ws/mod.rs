//! WebSocket stream of scheduler events.
//!
//! Every connected client receives every [`JobEvent`](atelier_events::JobEvent)
//! as a JSON text frame. Inbound frames other than close are ignored.

mod handler;

pub use handler::{event_message, ws_handler};
