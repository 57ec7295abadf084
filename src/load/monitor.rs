//! Venue load sampling.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::{VenueId, VenueMetrics};
use crate::error::CoreError;

/// Raw load reported by the real-time transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportSample {
    /// Open connections.
    pub connections: u64,
    /// Messages per second.
    pub message_rate: f64,
}

/// Source of live per-venue load.
#[async_trait]
pub trait TransportMonitor: Send + Sync + Debug {
    /// Returns the current load for `venue_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be queried.
    async fn venue_load(&self, venue_id: &VenueId) -> Result<TransportSample, CoreError>;
}

/// Samples venue load and remembers the latest sample per venue.
#[derive(Debug)]
pub struct LoadMonitor {
    transport: Arc<dyn TransportMonitor>,
    last: RwLock<HashMap<VenueId, VenueMetrics>>,
}

impl LoadMonitor {
    /// Creates a monitor reading from `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn TransportMonitor>) -> Self {
        Self {
            transport,
            last: RwLock::new(HashMap::new()),
        }
    }

    /// Samples `venue_id` and records the result.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if it cannot be queried.
    pub async fn track_venue(&self, venue_id: &VenueId) -> Result<VenueMetrics, CoreError> {
        let sample = self.transport.venue_load(venue_id).await?;
        let metrics = VenueMetrics {
            venue_id: venue_id.clone(),
            connections: sample.connections,
            message_rate: sample.message_rate,
            sampled_at: Utc::now(),
        };
        tracing::debug!(
            venue_id = %venue_id,
            connections = metrics.connections,
            message_rate = metrics.message_rate,
            "venue load sampled"
        );
        self.last.write().await.insert(venue_id.clone(), metrics.clone());
        Ok(metrics)
    }

    /// Returns the latest sample for `venue_id`.
    pub async fn last_sample(&self, venue_id: &VenueId) -> Option<VenueMetrics> {
        self.last.read().await.get(venue_id).cloned()
    }

    /// Drops the recorded sample for `venue_id`.
    pub async fn forget(&self, venue_id: &VenueId) {
        self.last.write().await.remove(venue_id);
    }
}
