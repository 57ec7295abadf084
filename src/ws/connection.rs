//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding venue-filtered events.
//! Payment notifications for a venue that is batching are skipped here;
//! they arrive later inside a `message_batch` event.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage};
use super::subscription::SubscriptionManager;
use crate::app_state::AppState;
use crate::domain::{CoreEvent, VenueId};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Counts the connection against `venue_id` for load sampling.
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    venue_id: Option<VenueId>,
    mut event_rx: broadcast::Receiver<CoreEvent>,
    state: AppState,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();
    if let Some(venue) = &venue_id {
        let open = state.tracker.connection_opened(venue);
        subs.subscribe([venue.as_str()]);
        tracing::debug!(venue_id = %venue, open, "ws connection opened");
    }

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        count_message(&state, venue_id.as_ref());
                        let response = handle_text_message(&text, &mut subs);
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Event from EventBus
            event = event_rx.recv() => {
                match event {
                    Ok(core_event) => {
                        if !should_forward(&state, &subs, &core_event).await {
                            continue;
                        }
                        let Some(json) = WsMessage::event(&core_event).to_json() else {
                            continue;
                        };
                        count_message(&state, venue_id.as_ref());
                        if ws_tx.send(Message::text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    if let Some(venue) = &venue_id {
        let open = state.tracker.connection_closed(venue);
        tracing::debug!(venue_id = %venue, open, "ws connection closed");
    } else {
        tracing::debug!("ws connection closed");
    }
}

fn count_message(state: &AppState, venue_id: Option<&VenueId>) {
    if let Some(venue) = venue_id {
        state.tracker.record_message(venue);
    }
}

async fn should_forward(state: &AppState, subs: &SubscriptionManager, event: &CoreEvent) -> bool {
    let venue = event.venue_id();
    if !subs.matches(venue) {
        return false;
    }
    !(event.is_batchable() && state.optimization.is_batching(venue).await)
}

/// Handles a text message from the client, returning an optional JSON response.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), 400, "malformed JSON").to_json();
    };

    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, 404, "unknown command").to_json();
    };

    let payload = match command {
        WsCommand::Subscribe { venue_ids } => {
            let added = subs.subscribe(venue_ids.iter().map(String::as_str));
            serde_json::json!({
                "subscribed": added.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::Unsubscribe { venue_ids } => {
            let removed = subs.unsubscribe(venue_ids.iter().map(String::as_str));
            serde_json::json!({
                "unsubscribed": removed.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "remaining_count": subs.count(),
            })
        }
        WsCommand::Ping => serde_json::json!({ "pong": true }),
    };
    WsMessage::response(msg.id, payload).to_json()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn command(payload: serde_json::Value) -> String {
        serde_json::json!({
            "id": "req-1",
            "type": "command",
            "timestamp": "2025-01-01T00:00:00Z",
            "payload": payload,
        })
        .to_string()
    }

    #[test]
    fn subscribe_reply_lists_added_venues() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message(
            &command(serde_json::json!({"command": "subscribe", "venue_ids": ["v1"]})),
            &mut subs,
        )
        .unwrap_or_default();
        assert!(reply.contains("\"subscribed\":[\"v1\"]"));
        assert!(subs.matches(&VenueId::new("v1")));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message("{not json", &mut subs).unwrap_or_default();
        assert!(reply.contains("malformed JSON"));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message(&command(serde_json::json!({"command": "teleport"})), &mut subs)
            .unwrap_or_default();
        assert!(reply.contains("unknown command"));
    }

    #[test]
    fn ping_gets_pong() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message(&command(serde_json::json!({"command": "ping"})), &mut subs)
            .unwrap_or_default();
        assert!(reply.contains("\"pong\":true"));
        assert!(reply.contains("\"id\":\"req-1\""));
    }
}
