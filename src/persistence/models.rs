//! Database models for idempotency records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::PaymentResult;
use crate::error::CoreError;

/// A row from the `payment_idempotency` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// Idempotency key.
    pub key: String,
    /// Serialized [`PaymentResult`] as JSONB.
    pub result: serde_json::Value,
    /// Time after which the record is ignored and purged.
    pub expires_at: DateTime<Utc>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Returns `true` once the record has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Decodes the stored payment result.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceError`] if the JSON does not match
    /// the [`PaymentResult`] shape.
    pub fn into_result(self) -> Result<PaymentResult, CoreError> {
        serde_json::from_value(self.result).map_err(|e| {
            CoreError::PersistenceError(format!("corrupt idempotency record {}: {e}", self.key))
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::{PaymentStatus, VenueId};

    #[test]
    fn decodes_stored_result() {
        let result = PaymentResult {
            id: "ch_1".to_string(),
            status: PaymentStatus::Succeeded,
            amount: 500,
            currency: "usd".to_string(),
            venue_id: VenueId::new("v1"),
            customer_id: "cus_1".to_string(),
            created_at: Utc::now(),
        };
        let Ok(json) = serde_json::to_value(&result) else {
            panic!("result should serialize");
        };
        let now = Utc::now();
        let record = IdempotencyRecord {
            key: "V1_abc".to_string(),
            result: json,
            expires_at: now + Duration::seconds(60),
            created_at: now,
        };
        assert!(!record.is_expired(now));
        let Ok(decoded) = record.into_result() else {
            panic!("record should decode");
        };
        assert_eq!(decoded, result);
    }

    #[test]
    fn corrupt_payload_is_a_persistence_error() {
        let now = Utc::now();
        let record = IdempotencyRecord {
            key: "V1_bad".to_string(),
            result: serde_json::json!({"id": 1}),
            expires_at: now,
            created_at: now,
        };
        assert!(record.is_expired(now));
        let Err(err) = record.into_result() else {
            panic!("expected decode failure");
        };
        assert_eq!(err.error_code(), "persistence_error");
    }
}
