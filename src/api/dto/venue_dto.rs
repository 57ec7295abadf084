//! Venue load and optimization DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::optimization::{OptimizationDecision, OptimizationProfile};

/// Channel optimizations active for a venue.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OptimizationProfileDto {
    /// Venue the profile applies to.
    pub venue_id: String,
    /// Payment events are batched.
    pub batching_enabled: bool,
    /// Batches are gzip-compressed.
    pub compression_enabled: bool,
    /// Gzip level.
    pub compression_level: u32,
    /// Connection pool multiplier.
    pub pool_multiplier: f64,
    /// A dependent service's breaker is open.
    pub emergency: bool,
    /// Services whose breaker for this venue is open.
    pub open_services: Vec<String>,
    /// `normal`, `warning`, or `critical`.
    pub load_level: String,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

impl From<OptimizationProfile> for OptimizationProfileDto {
    fn from(profile: OptimizationProfile) -> Self {
        Self {
            venue_id: profile.venue_id.to_string(),
            batching_enabled: profile.batching_enabled,
            compression_enabled: profile.compression_enabled,
            compression_level: profile.compression_level,
            pool_multiplier: profile.pool_multiplier,
            emergency: profile.emergency,
            open_services: profile.open_services.into_iter().collect(),
            load_level: profile.load_level.as_str().to_string(),
            updated_at: profile.updated_at,
        }
    }
}

/// Optimizations a load sample calls for.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OptimizationDecisionDto {
    /// `normal`, `warning`, or `critical`.
    pub level: String,
    /// Batching is warranted.
    pub batching: bool,
    /// Compression is warranted.
    pub compression: bool,
}

impl From<OptimizationDecision> for OptimizationDecisionDto {
    fn from(decision: OptimizationDecision) -> Self {
        Self {
            level: decision.level.as_str().to_string(),
            batching: decision.batching,
            compression: decision.compression,
        }
    }
}

/// Response body for `GET /venues/{venue_id}/load`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VenueLoadResponse {
    /// Venue sampled.
    pub venue_id: String,
    /// Open real-time connections.
    pub connections: u64,
    /// Messages per second.
    pub message_rate: f64,
    /// Sample time.
    pub sampled_at: DateTime<Utc>,
    /// What the sample calls for.
    pub decision: OptimizationDecisionDto,
    /// Profile after applying the sample.
    pub profile: Option<OptimizationProfileDto>,
}
