//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::VenueId;

/// Query parameters accepted by the upgrade endpoint.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Venue whose channel this connection belongs to.
    pub venue_id: Option<String>,
}

/// `GET /ws?venue_id=...` — Upgrade HTTP connection to WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let venue_id = params
        .venue_id
        .map(VenueId::new)
        .filter(|venue| !venue.is_blank());
    let event_rx = state.event_bus.subscribe();

    ws.on_upgrade(move |socket| run_connection(socket, venue_id, event_rx, state))
}
