//! Domain events emitted by the payment core.
//!
//! Breaker transitions, load threshold crossings, and payment outcomes are
//! published as [`CoreEvent`]s through the [`super::EventBus`]. The
//! optimization manager subscribes to breaker events; WebSocket clients
//! receive the venue-scoped ones.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{LoadLevel, PaymentStatus, VenueId};

/// Wire encoding of a [`CoreEvent::MessageBatch`] payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchEncoding {
    /// `payload` is a JSON array of messages.
    Json,
    /// `payload` is a base64 string of the gzip-compressed JSON array.
    GzipBase64,
}

/// Event published on the core event bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum CoreEvent {
    /// A breaker moved to `open`.
    BreakerOpened {
        /// Breaker service name.
        service: String,
        /// Venue the breaker guards.
        venue_id: VenueId,
        /// Failure count at the time of opening.
        failures: u32,
        /// Last recorded error message.
        last_error: Option<String>,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },

    /// A breaker moved to `half_open`.
    BreakerHalfOpen {
        /// Breaker service name.
        service: String,
        /// Venue the breaker guards.
        venue_id: VenueId,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },

    /// A breaker moved to `closed`.
    BreakerClosed {
        /// Breaker service name.
        service: String,
        /// Venue the breaker guards.
        venue_id: VenueId,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },

    /// A venue's load crossed an optimization threshold.
    ThresholdReached {
        /// Venue sampled.
        venue_id: VenueId,
        /// Load band reached.
        level: LoadLevel,
        /// Connection count in the sample.
        connections: u64,
        /// Sample time.
        timestamp: DateTime<Utc>,
    },

    /// A payment was accepted by the gateway.
    PaymentSucceeded {
        /// Venue the payment belongs to.
        venue_id: VenueId,
        /// Gateway charge ID.
        payment_id: String,
        /// Amount in minor units.
        amount: i64,
        /// Currency code.
        currency: String,
        /// Charge status at creation.
        status: PaymentStatus,
        /// Event time.
        timestamp: DateTime<Utc>,
    },

    /// A payment attempt failed.
    PaymentFailed {
        /// Venue the payment belongs to.
        venue_id: VenueId,
        /// Idempotency key of the failed attempt.
        idempotency_key: String,
        /// Stable error code.
        code: String,
        /// Error message.
        message: String,
        /// Event time.
        timestamp: DateTime<Utc>,
    },

    /// A cached payment changed status after a webhook notification.
    PaymentStatusChanged {
        /// Venue the payment belongs to.
        venue_id: VenueId,
        /// Gateway charge ID.
        payment_id: String,
        /// New status.
        status: PaymentStatus,
        /// Event time.
        timestamp: DateTime<Utc>,
    },

    /// A flushed batch of queued venue messages.
    MessageBatch {
        /// Venue the batch belongs to.
        venue_id: VenueId,
        /// Number of messages in the batch.
        count: usize,
        /// Encoding of `payload`.
        encoding: BatchEncoding,
        /// Batched messages.
        payload: serde_json::Value,
        /// Flush time.
        timestamp: DateTime<Utc>,
    },
}

impl CoreEvent {
    /// Returns the venue this event belongs to.
    #[must_use]
    pub fn venue_id(&self) -> &VenueId {
        match self {
            Self::BreakerOpened { venue_id, .. }
            | Self::BreakerHalfOpen { venue_id, .. }
            | Self::BreakerClosed { venue_id, .. }
            | Self::ThresholdReached { venue_id, .. }
            | Self::PaymentSucceeded { venue_id, .. }
            | Self::PaymentFailed { venue_id, .. }
            | Self::PaymentStatusChanged { venue_id, .. }
            | Self::MessageBatch { venue_id, .. } => venue_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::BreakerOpened { .. } => "breaker_opened",
            Self::BreakerHalfOpen { .. } => "breaker_half_open",
            Self::BreakerClosed { .. } => "breaker_closed",
            Self::ThresholdReached { .. } => "threshold_reached",
            Self::PaymentSucceeded { .. } => "payment_succeeded",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::PaymentStatusChanged { .. } => "payment_status_changed",
            Self::MessageBatch { .. } => "message_batch",
        }
    }

    /// Returns `true` for per-payment notifications that may be batched
    /// on a venue's real-time channel.
    #[must_use]
    pub const fn is_batchable(&self) -> bool {
        matches!(
            self,
            Self::PaymentSucceeded { .. }
                | Self::PaymentFailed { .. }
                | Self::PaymentStatusChanged { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opened_serializes_with_tag() {
        let event = CoreEvent::BreakerOpened {
            service: "payment_gateway".to_string(),
            venue_id: VenueId::new("v1"),
            failures: 2,
            last_error: Some("boom".to_string()),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap_or_default();
        assert!(json.contains("\"event_type\":\"breaker_opened\""));
        assert!(json.contains("\"venue_id\":\"v1\""));
    }

    #[test]
    fn only_payment_events_are_batchable() {
        let payment = CoreEvent::PaymentStatusChanged {
            venue_id: VenueId::new("v1"),
            payment_id: "ch_1".to_string(),
            status: PaymentStatus::Failed,
            timestamp: Utc::now(),
        };
        let breaker = CoreEvent::BreakerClosed {
            service: "payment_gateway".to_string(),
            venue_id: VenueId::new("v1"),
            timestamp: Utc::now(),
        };
        assert!(payment.is_batchable());
        assert!(!breaker.is_batchable());
        assert_eq!(breaker.event_type_str(), "breaker_closed");
        assert_eq!(payment.venue_id().as_str(), "v1");
    }
}
