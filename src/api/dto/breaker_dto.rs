//! Circuit breaker DTOs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::breaker::{BreakerSnapshot, CallMetrics};

/// Call statistics for one breaker.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CallMetricsDto {
    /// Calls that reached the wrapped function.
    pub total_calls: u64,
    /// Successful calls.
    pub successful_calls: u64,
    /// Failed calls.
    pub failed_calls: u64,
    /// Running mean of call latency in milliseconds.
    pub avg_response_time_ms: f64,
}

impl From<CallMetrics> for CallMetricsDto {
    fn from(metrics: CallMetrics) -> Self {
        Self {
            total_calls: metrics.total_calls,
            successful_calls: metrics.successful_calls,
            failed_calls: metrics.failed_calls,
            avg_response_time_ms: metrics.avg_response_time_ms,
        }
    }
}

/// State of one `(service, venue)` breaker.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BreakerResponse {
    /// Breaker service name.
    pub service: String,
    /// Venue the breaker guards.
    pub venue_id: String,
    /// `closed`, `open`, or `half_open`.
    pub state: String,
    /// Consecutive failures.
    pub failures: u32,
    /// Successes in the current state.
    pub successes: u32,
    /// Time of the most recent failure.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Probe calls admitted since the last close.
    pub half_open_attempts: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Milliseconds until an open breaker admits a probe.
    pub retry_after_ms: u64,
    /// Call statistics.
    pub metrics: CallMetricsDto,
}

impl From<BreakerSnapshot> for BreakerResponse {
    fn from(snapshot: BreakerSnapshot) -> Self {
        Self {
            service: snapshot.service,
            venue_id: snapshot.venue_id.to_string(),
            state: snapshot.state.as_str().to_string(),
            failures: snapshot.failures,
            successes: snapshot.successes,
            last_failure_time: snapshot.last_failure_time,
            half_open_attempts: snapshot.half_open_attempts,
            last_error: snapshot.last_error,
            retry_after_ms: snapshot.retry_after_ms,
            metrics: snapshot.metrics.into(),
        }
    }
}

/// Breaker listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BreakerListResponse {
    /// Breakers, sorted by service then venue.
    pub data: Vec<BreakerResponse>,
    /// Number of breakers returned.
    pub total: usize,
}
