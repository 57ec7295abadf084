//! Payment gateway client seam.
//!
//! The core only needs three gateway operations: create a charge, list a
//! customer's recent charges, and refund. Every created charge carries the
//! idempotency key both as a request header (so the gateway deduplicates at
//! its boundary) and in metadata (so prior charges can be found again).

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{IdempotencyKey, PaymentResult, PaymentStatus, RefundResult, VenueId};
use crate::error::CoreError;

/// Metadata field carrying the idempotency key on gateway charges.
pub const IDEMPOTENCY_METADATA_KEY: &str = "idempotency_key";

/// Metadata field carrying the venue on gateway charges.
pub const VENUE_METADATA_KEY: &str = "venue_id";

/// A charge creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeRequest {
    /// Amount in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Customer to charge.
    pub customer_id: String,
    /// Charge metadata, including the idempotency and venue tags.
    pub metadata: BTreeMap<String, String>,
    /// Idempotency key passed through to the gateway.
    #[serde(skip)]
    pub idempotency_key: IdempotencyKey,
}

/// A charge as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    /// Gateway charge ID.
    pub id: String,
    /// Gateway status string.
    pub status: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Charged customer.
    #[serde(default)]
    pub customer_id: String,
    /// Creation time in Unix seconds.
    pub created: i64,
    /// Charge metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Charge {
    /// Returns the idempotency key tag, if the charge carries one.
    #[must_use]
    pub fn idempotency_tag(&self) -> Option<&str> {
        self.metadata.get(IDEMPOTENCY_METADATA_KEY).map(String::as_str)
    }

    /// Converts the charge into a [`PaymentResult`] for `venue_id`.
    #[must_use]
    pub fn into_result(self, venue_id: VenueId) -> PaymentResult {
        let created_at = DateTime::<Utc>::from_timestamp(self.created, 0).unwrap_or_else(Utc::now);
        PaymentResult {
            id: self.id,
            status: PaymentStatus::from_gateway(&self.status),
            amount: self.amount,
            currency: self.currency,
            venue_id,
            customer_id: self.customer_id,
            created_at,
        }
    }
}

/// A refund as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    /// Gateway refund ID.
    pub id: String,
    /// Refunded charge.
    #[serde(default)]
    pub charge_id: String,
    /// Gateway status string.
    pub status: String,
    /// Refunded amount in minor units.
    pub amount: i64,
}

impl From<Refund> for RefundResult {
    fn from(refund: Refund) -> Self {
        Self {
            id: refund.id,
            charge_id: refund.charge_id,
            status: refund.status,
            amount: refund.amount,
        }
    }
}

/// External payment gateway.
///
/// Implementations report gateway-side rejections as
/// [`CoreError::Gateway`] with the gateway's own code and message.
#[async_trait]
pub trait GatewayClient: Send + Sync + Debug {
    /// Creates a charge, deduplicated by `request.idempotency_key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Gateway`] if the gateway rejects the charge.
    async fn create_charge(&self, request: &ChargeRequest) -> Result<Charge, CoreError>;

    /// Lists a customer's most recent charges, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Gateway`] if the gateway rejects the call.
    async fn list_charges(&self, customer_id: &str, limit: u32) -> Result<Vec<Charge>, CoreError>;

    /// Refunds a charge, fully when `amount` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Gateway`] if the gateway rejects the refund.
    async fn refund(&self, charge_id: &str, amount: Option<i64>) -> Result<Refund, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_converts_to_result() {
        let charge = Charge {
            id: "ch_1".to_string(),
            status: "succeeded".to_string(),
            amount: 2500,
            currency: "usd".to_string(),
            customer_id: "cus_1".to_string(),
            created: 1_700_000_000,
            metadata: BTreeMap::from([(IDEMPOTENCY_METADATA_KEY.to_string(), "V1_abc".to_string())]),
        };
        assert_eq!(charge.idempotency_tag(), Some("V1_abc"));

        let result = charge.into_result(VenueId::new("v1"));
        assert_eq!(result.status, PaymentStatus::Succeeded);
        assert_eq!(result.created_at.timestamp(), 1_700_000_000);
        assert_eq!(result.venue_id.as_str(), "v1");
    }
}
