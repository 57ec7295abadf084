//! Payment DTOs: intents, results, refunds, webhooks, metrics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{
    IdempotencyKey, PaymentIntent, PaymentResult, PaymentStatus, PaymentWebhook, RefundResult,
};
use crate::error::CoreError;
use crate::payment::PaymentMetricsSnapshot;

/// Request body for `POST /payments`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    /// Amount in minor currency units.
    pub amount: i64,
    /// ISO-4217 currency code.
    pub currency: String,
    /// Venue the payment is made at.
    pub venue_id: String,
    /// Paying customer.
    pub customer_id: String,
    /// Caller metadata; part of the idempotency key.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl From<CreatePaymentRequest> for PaymentIntent {
    fn from(req: CreatePaymentRequest) -> Self {
        Self {
            amount: req.amount,
            currency: req.currency,
            venue_id: req.venue_id.into(),
            customer_id: req.customer_id,
            metadata: req.metadata,
        }
    }
}

/// A processed payment.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentResponse {
    /// Gateway charge ID.
    pub id: String,
    /// Idempotency key the result is recorded under.
    pub idempotency_key: String,
    /// `succeeded`, `failed`, or `pending`.
    pub status: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Venue the payment belongs to.
    pub venue_id: String,
    /// Paying customer.
    pub customer_id: String,
    /// Charge creation time.
    pub created_at: DateTime<Utc>,
}

impl PaymentResponse {
    /// Builds the response for `result` recorded under `key`.
    #[must_use]
    pub fn new(key: &IdempotencyKey, result: PaymentResult) -> Self {
        Self {
            id: result.id,
            idempotency_key: key.to_string(),
            status: result.status.as_str().to_string(),
            amount: result.amount,
            currency: result.currency,
            venue_id: result.venue_id.to_string(),
            customer_id: result.customer_id,
            created_at: result.created_at,
        }
    }
}

/// Request body for `POST /payments/{charge_id}/refund`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefundRequest {
    /// Venue whose breaker guards the refund.
    pub venue_id: String,
    /// Amount to refund; the remaining balance when omitted.
    #[serde(default)]
    pub amount: Option<i64>,
}

/// A completed refund.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefundResponse {
    /// Gateway refund ID.
    pub id: String,
    /// Refunded charge.
    pub charge_id: String,
    /// Gateway refund status.
    pub status: String,
    /// Refunded amount in minor units.
    pub amount: i64,
}

impl From<RefundResult> for RefundResponse {
    fn from(refund: RefundResult) -> Self {
        Self {
            id: refund.id,
            charge_id: refund.charge_id,
            status: refund.status,
            amount: refund.amount,
        }
    }
}

/// Request body for `POST /webhooks/payments`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PaymentWebhookRequest {
    /// Charge the notification refers to.
    pub charge_id: String,
    /// Idempotency key echoed by the gateway, if any.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// New status: `succeeded`, `failed`, or `pending`.
    pub status: String,
}

impl TryFrom<PaymentWebhookRequest> for PaymentWebhook {
    type Error = CoreError;

    fn try_from(req: PaymentWebhookRequest) -> Result<Self, Self::Error> {
        let status = match req.status.as_str() {
            "succeeded" => PaymentStatus::Succeeded,
            "failed" => PaymentStatus::Failed,
            "pending" => PaymentStatus::Pending,
            other => {
                return Err(CoreError::InvalidRequest(format!("unknown payment status: {other}")));
            }
        };
        Ok(Self {
            charge_id: req.charge_id,
            idempotency_key: req.idempotency_key,
            status,
        })
    }
}

/// Payment metrics for a venue.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentMetricsResponse {
    /// Venue reported.
    pub venue_id: String,
    /// Payments that reached the breaker.
    pub total_payments: u64,
    /// Payments the gateway accepted.
    pub successful_payments: u64,
    /// Payments that failed.
    pub failed_payments: u64,
    /// Sum of accepted amounts in minor units.
    pub total_amount: i64,
    /// Time of the most recent accepted payment.
    pub last_payment_time: Option<DateTime<Utc>>,
    /// Success percentage; 100 with no payments.
    pub success_rate: f64,
}

impl From<PaymentMetricsSnapshot> for PaymentMetricsResponse {
    fn from(snapshot: PaymentMetricsSnapshot) -> Self {
        Self {
            venue_id: snapshot.venue_id.to_string(),
            total_payments: snapshot.total_payments,
            successful_payments: snapshot.successful_payments,
            failed_payments: snapshot.failed_payments,
            total_amount: snapshot.total_amount,
            last_payment_time: snapshot.last_payment_time,
            success_rate: snapshot.success_rate,
        }
    }
}
