//! Per-venue optimization profiles and the load decision.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::OptimizationConfig;
use crate::domain::{LoadLevel, VenueId, VenueMetrics};

/// Channel optimizations active for one venue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationProfile {
    /// Venue the profile applies to.
    pub venue_id: VenueId,
    /// Payment events are queued and flushed as batches.
    pub batching_enabled: bool,
    /// Batches are gzip-compressed.
    pub compression_enabled: bool,
    /// Gzip level for compressed batches.
    pub compression_level: u32,
    /// Multiplier applied to the venue's connection pool.
    pub pool_multiplier: f64,
    /// Set while a dependent service's breaker is open.
    pub emergency: bool,
    /// Services whose breaker for this venue is currently open.
    pub open_services: BTreeSet<String>,
    /// Load band at the last optimization pass.
    pub load_level: LoadLevel,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

impl OptimizationProfile {
    pub(crate) fn new(venue_id: VenueId, config: &OptimizationConfig) -> Self {
        Self {
            venue_id,
            batching_enabled: false,
            compression_enabled: false,
            compression_level: config.compression_level,
            pool_multiplier: 1.0,
            emergency: false,
            open_services: BTreeSet::new(),
            load_level: LoadLevel::Normal,
            updated_at: Utc::now(),
        }
    }
}

/// What a load sample calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptimizationDecision {
    /// Load band of the sample.
    pub level: LoadLevel,
    /// Message batching is warranted.
    pub batching: bool,
    /// Compression is warranted.
    pub compression: bool,
}

/// Classifies a connection count against the configured thresholds.
#[must_use]
pub fn load_level(connections: u64, config: &OptimizationConfig) -> LoadLevel {
    if connections >= config.critical_connections {
        LoadLevel::Critical
    } else if connections >= config.warning_connections {
        LoadLevel::Warning
    } else {
        LoadLevel::Normal
    }
}

/// Decides which optimizations a sample warrants.
#[must_use]
pub fn should_optimize(metrics: &VenueMetrics, config: &OptimizationConfig) -> OptimizationDecision {
    let level = load_level(metrics.connections, config);
    OptimizationDecision {
        level,
        batching: level >= LoadLevel::Warning,
        compression: level >= LoadLevel::Critical,
    }
}
