use atelier_events::JobEvent;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize one event as a text frame.
pub fn event_message(event: &JobEvent) -> Result<Message, serde_json::Error> {
    Ok(Message::Text(serde_json::to_string(event)?.into()))
}

/// Forward scheduler events to one client until it disconnects, the event
/// bus closes, or the server shuts down.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::now_v7();
    tracing::info!(%conn_id, "WebSocket connected");

    let mut events = state.scheduler.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    let message = match event_message(&event) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::warn!(%conn_id, error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if sink.send(message).await.is_err() {
                        tracing::debug!(%conn_id, "WebSocket sink closed");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%conn_id, skipped, "WebSocket client lagging; events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(%conn_id, error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    tracing::info!(%conn_id, "WebSocket disconnected");
}
