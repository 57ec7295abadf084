//! Per-connection subscription manager.
//!
//! Tracks which venues a WebSocket client is subscribed to and provides
//! server-side event filtering.

use std::collections::HashSet;

use crate::domain::VenueId;

/// Wildcard venue ID matching every venue.
pub const WILDCARD: &str = "*";

/// Manages the set of venue subscriptions for a single WebSocket connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed venues. Ignored while `subscribe_all` is set.
    venue_ids: HashSet<VenueId>,
    /// Whether the client subscribes to all venues (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds venues to the subscription set; `"*"` enables the wildcard.
    ///
    /// Returns the venues that were added explicitly.
    pub fn subscribe<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Vec<VenueId> {
        let mut added = Vec::new();
        for raw in ids {
            let raw = raw.trim();
            if raw == WILDCARD {
                self.subscribe_all = true;
            } else if !raw.is_empty() {
                let id = VenueId::new(raw);
                self.venue_ids.insert(id.clone());
                added.push(id);
            }
        }
        added
    }

    /// Removes venues from the subscription set; `"*"` clears the wildcard.
    pub fn unsubscribe<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> Vec<VenueId> {
        let mut removed = Vec::new();
        for raw in ids {
            let raw = raw.trim();
            if raw == WILDCARD {
                self.subscribe_all = false;
            } else {
                let id = VenueId::new(raw);
                if self.venue_ids.remove(&id) {
                    removed.push(id);
                }
            }
        }
        removed
    }

    /// Returns `true` if events for `venue_id` pass the filter.
    #[must_use]
    pub fn matches(&self, venue_id: &VenueId) -> bool {
        self.subscribe_all || self.venue_ids.contains(venue_id)
    }

    /// Returns the number of explicitly subscribed venues.
    #[must_use]
    pub fn count(&self) -> usize {
        self.venue_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}
