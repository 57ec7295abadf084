//! WebSocket layer: venue channels, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws?venue_id=...` streams core events for
//! the connection's venue. Open connections and message traffic are
//! counted per venue and feed the load monitor.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
