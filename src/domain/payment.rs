//! Payment intents, results, and gateway notifications.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::VenueId;
use crate::error::CoreError;

/// A caller's request to charge a customer at a venue.
///
/// Immutable once built. `metadata` is an ordered map so that the
/// idempotency key does not depend on insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Amount in minor currency units (e.g. cents).
    pub amount: i64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Venue the payment is made at.
    pub venue_id: VenueId,
    /// Paying customer.
    pub customer_id: String,
    /// Caller metadata (order ID, pass type, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PaymentIntent {
    /// Creates an intent with empty metadata.
    #[must_use]
    pub fn new(
        amount: i64,
        currency: impl Into<String>,
        venue_id: impl Into<VenueId>,
        customer_id: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            currency: currency.into(),
            venue_id: venue_id.into(),
            customer_id: customer_id.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry, returning the updated intent.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Checks that the intent can be sent to a gateway.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIntent`] if the venue or customer is
    /// missing, the currency is empty, or the amount is not positive.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.venue_id.is_blank() {
            return Err(CoreError::InvalidIntent("venue_id is required".to_string()));
        }
        if self.customer_id.trim().is_empty() {
            return Err(CoreError::InvalidIntent("customer_id is required".to_string()));
        }
        if self.currency.trim().is_empty() {
            return Err(CoreError::InvalidIntent("currency is required".to_string()));
        }
        if self.amount <= 0 {
            return Err(CoreError::InvalidIntent(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Lifecycle status of a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// The charge settled.
    Succeeded,
    /// The charge failed after creation (e.g. reported by webhook).
    Failed,
    /// The gateway accepted the charge but has not settled it.
    Pending,
}

impl PaymentStatus {
    /// Parses a gateway status string, treating unknown values as pending.
    #[must_use]
    pub fn from_gateway(status: &str) -> Self {
        match status {
            "succeeded" | "paid" | "captured" => Self::Succeeded,
            "failed" | "canceled" | "cancelled" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Returns the snake_case name of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

/// Outcome of a payment attempt, cached against its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    /// Gateway charge ID.
    pub id: String,
    /// Charge status.
    pub status: PaymentStatus,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Venue the payment belongs to.
    pub venue_id: VenueId,
    /// Paying customer.
    pub customer_id: String,
    /// Charge creation time as reported by the gateway.
    pub created_at: DateTime<Utc>,
}

/// Outcome of a refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    /// Gateway refund ID.
    pub id: String,
    /// Refunded charge.
    pub charge_id: String,
    /// Gateway refund status string.
    pub status: String,
    /// Refunded amount in minor units.
    pub amount: i64,
}

/// Asynchronous status notification for a charge delivered by the
/// webhook ingestion layer. Signatures are verified upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWebhook {
    /// Charge the notification refers to.
    pub charge_id: String,
    /// Idempotency key the charge was tagged with, if the gateway echoed it.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// New status.
    pub status: PaymentStatus,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn missing_venue_is_invalid() {
        let intent = PaymentIntent::new(1000, "usd", "", "cus_1");
        let Err(err) = intent.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(err.error_code(), "invalid_intent");
    }

    #[test]
    fn non_positive_amount_is_invalid() {
        let intent = PaymentIntent::new(0, "usd", "v1", "cus_1");
        assert!(intent.validate().is_err());
    }

    #[test]
    fn well_formed_intent_validates() {
        let intent = PaymentIntent::new(2500, "usd", "v1", "cus_1").with_metadata("order", "o-1");
        assert!(intent.validate().is_ok());
        assert_eq!(intent.metadata.get("order").map(String::as_str), Some("o-1"));
    }

    #[test]
    fn gateway_status_parsing() {
        assert_eq!(PaymentStatus::from_gateway("succeeded"), PaymentStatus::Succeeded);
        assert_eq!(PaymentStatus::from_gateway("canceled"), PaymentStatus::Failed);
        assert_eq!(PaymentStatus::from_gateway("requires_action"), PaymentStatus::Pending);
    }
}
