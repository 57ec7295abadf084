//! Live load samples for a venue's real-time channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VenueId;

/// Point-in-time connection and message load for one venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueMetrics {
    /// Venue sampled.
    pub venue_id: VenueId,
    /// Open real-time connections.
    pub connections: u64,
    /// Messages per second across those connections.
    pub message_rate: f64,
    /// Sample time.
    pub sampled_at: DateTime<Utc>,
}

/// Load band a venue falls in relative to the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    /// Below the warning threshold.
    Normal,
    /// At or above the warning threshold: batch messages.
    Warning,
    /// At or above the critical threshold: batch and compress.
    Critical,
}

impl LoadLevel {
    /// Returns the snake_case name of the level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}
