//! Per-venue connection and message counters for the real-time channel.
//!
//! Message rate is measured over fixed windows: once a window has run its
//! course, the rate for that window is kept until the next one closes.

use std::collections::HashMap;
use std::sync::{MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::monitor::{TransportMonitor, TransportSample};
use crate::domain::VenueId;
use crate::error::CoreError;

/// Default rate window.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct VenueTraffic {
    connections: u64,
    window_start: Instant,
    window_messages: u64,
    last_rate: Option<f64>,
}

impl VenueTraffic {
    fn new(now: Instant) -> Self {
        Self {
            connections: 0,
            window_start: now,
            window_messages: 0,
            last_rate: None,
        }
    }

    fn rate(&mut self, now: Instant, window: Duration) -> f64 {
        let elapsed = now.saturating_duration_since(self.window_start);
        #[allow(clippy::cast_precision_loss)]
        let current = if elapsed.is_zero() {
            0.0
        } else {
            self.window_messages as f64 / elapsed.as_secs_f64()
        };
        if elapsed >= window {
            self.last_rate = Some(current);
            self.window_start = now;
            self.window_messages = 0;
        }
        self.last_rate.unwrap_or(current)
    }
}

/// Counts open connections and message traffic per venue.
#[derive(Debug)]
pub struct ConnectionTracker {
    window: Duration,
    venues: std::sync::Mutex<HashMap<VenueId, VenueTraffic>>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_WINDOW)
    }
}

impl ConnectionTracker {
    /// Creates a tracker measuring message rate over `window`.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.max(Duration::from_millis(1)),
            venues: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Records a new connection for `venue_id`, returning the new count.
    pub fn connection_opened(&self, venue_id: &VenueId) -> u64 {
        let mut venues = self.venues();
        let traffic = venues
            .entry(venue_id.clone())
            .or_insert_with(|| VenueTraffic::new(Instant::now()));
        traffic.connections = traffic.connections.saturating_add(1);
        traffic.connections
    }

    /// Records a closed connection for `venue_id`, returning the new count.
    pub fn connection_closed(&self, venue_id: &VenueId) -> u64 {
        let mut venues = self.venues();
        let Some(traffic) = venues.get_mut(venue_id) else {
            return 0;
        };
        traffic.connections = traffic.connections.saturating_sub(1);
        traffic.connections
    }

    /// Counts one message sent or received on a `venue_id` connection.
    pub fn record_message(&self, venue_id: &VenueId) {
        let mut venues = self.venues();
        let traffic = venues
            .entry(venue_id.clone())
            .or_insert_with(|| VenueTraffic::new(Instant::now()));
        traffic.window_messages = traffic.window_messages.saturating_add(1);
    }

    /// Open connections for `venue_id`.
    #[must_use]
    pub fn connections(&self, venue_id: &VenueId) -> u64 {
        self.venues().get(venue_id).map_or(0, |t| t.connections)
    }

    /// Every venue the tracker has seen, sorted.
    #[must_use]
    pub fn known_venues(&self) -> Vec<VenueId> {
        let mut venues: Vec<VenueId> = self.venues().keys().cloned().collect();
        venues.sort();
        venues
    }

    /// Drops the counters for `venue_id` if it has no open connections.
    pub fn forget_idle(&self, venue_id: &VenueId) -> bool {
        let mut venues = self.venues();
        if venues.get(venue_id).is_some_and(|t| t.connections == 0) {
            venues.remove(venue_id);
            return true;
        }
        false
    }

    /// Samples connections and message rate for `venue_id`.
    #[must_use]
    pub fn sample(&self, venue_id: &VenueId) -> TransportSample {
        let window = self.window;
        let mut venues = self.venues();
        match venues.get_mut(venue_id) {
            Some(traffic) => TransportSample {
                connections: traffic.connections,
                message_rate: traffic.rate(Instant::now(), window),
            },
            None => TransportSample::default(),
        }
    }

    fn venues(&self) -> MutexGuard<'_, HashMap<VenueId, VenueTraffic>> {
        self.venues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TransportMonitor for ConnectionTracker {
    async fn venue_load(&self, venue_id: &VenueId) -> Result<TransportSample, CoreError> {
        Ok(self.sample(venue_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_connections_per_venue() {
        let tracker = ConnectionTracker::default();
        let v1 = VenueId::new("v1");
        let v2 = VenueId::new("v2");
        tracker.connection_opened(&v1);
        tracker.connection_opened(&v1);
        tracker.connection_opened(&v2);
        assert_eq!(tracker.connection_closed(&v1), 1);
        assert_eq!(tracker.connections(&v1), 1);
        assert_eq!(tracker.connections(&v2), 1);
        assert_eq!(tracker.known_venues(), vec![v1, v2]);
    }

    #[test]
    fn closing_unknown_venue_is_harmless() {
        let tracker = ConnectionTracker::default();
        assert_eq!(tracker.connection_closed(&VenueId::new("ghost")), 0);
        assert!(tracker.known_venues().is_empty());
    }

    #[test]
    fn idle_venues_are_forgotten() {
        let tracker = ConnectionTracker::default();
        let v1 = VenueId::new("v1");
        tracker.connection_opened(&v1);
        assert!(!tracker.forget_idle(&v1));
        tracker.connection_closed(&v1);
        assert!(tracker.forget_idle(&v1));
        assert_eq!(tracker.sample(&v1), TransportSample::default());
    }

    #[test]
    fn rate_is_kept_after_window_closes() {
        let start = Instant::now();
        let mut traffic = VenueTraffic::new(start);
        traffic.window_messages = 50;
        let rate = traffic.rate(start + Duration::from_secs(10), Duration::from_secs(10));
        assert!((rate - 5.0).abs() < 1e-9);
        assert_eq!(traffic.window_messages, 0);
        let later = traffic.rate(start + Duration::from_secs(12), Duration::from_secs(10));
        assert!((later - 5.0).abs() < 1e-9);
    }
}
