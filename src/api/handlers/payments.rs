//! Payment handlers: process, look up, refund, webhooks, metrics.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CreatePaymentRequest, PaymentMetricsResponse, PaymentResponse, PaymentWebhookRequest,
    RefundRequest, RefundResponse,
};
use crate::app_state::AppState;
use crate::domain::{IdempotencyKey, PaymentIntent, PaymentWebhook, VenueId};
use crate::error::{CoreError, ErrorResponse};

/// `POST /payments` — Process a payment intent.
///
/// # Errors
///
/// Returns [`CoreError`] on invalid intents, exhausted retries, open
/// breakers, timeouts, and gateway rejections.
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    tag = "Payments",
    summary = "Process a payment",
    description = "Charges the customer at most once per logical intent. Repeating an intent returns the recorded result.",
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment processed", body = PaymentResponse),
        (status = 400, description = "Invalid intent", body = ErrorResponse),
        (status = 402, description = "Declined by the gateway", body = ErrorResponse),
        (status = 409, description = "Retry budget exhausted for this intent", body = ErrorResponse),
        (status = 503, description = "Circuit breaker open for the venue", body = ErrorResponse),
        (status = 504, description = "Gateway timed out", body = ErrorResponse),
    )
)]
pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let intent = PaymentIntent::from(req);
    let key = IdempotencyKey::for_intent(&intent);
    let result = state.payments.process_payment(intent).await?;
    Ok((StatusCode::CREATED, Json(PaymentResponse::new(&key, result))))
}

/// `GET /payments/{id}` — Recorded result for an idempotency key.
///
/// # Errors
///
/// Returns [`CoreError::PaymentNotFound`] if nothing is recorded.
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    tag = "Payments",
    summary = "Get payment by idempotency key",
    params(("id" = String, Path, description = "Idempotency key")),
    responses(
        (status = 200, description = "Recorded payment", body = PaymentResponse),
        (status = 404, description = "No payment recorded", body = ErrorResponse),
    )
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let key = IdempotencyKey::from_raw(key);
    let result = state.payments.get_payment(&key).await?;
    Ok(Json(PaymentResponse::new(&key, result)))
}

/// `POST /payments/{id}/refund` — Refund a charge.
///
/// # Errors
///
/// Returns [`CoreError`] on breaker rejection or gateway errors.
#[utoipa::path(
    post,
    path = "/api/v1/payments/{id}/refund",
    tag = "Payments",
    summary = "Refund a charge",
    description = "Refunds through the venue's circuit breaker. Omitting `amount` refunds the remaining balance.",
    params(("id" = String, Path, description = "Gateway charge ID")),
    request_body = RefundRequest,
    responses(
        (status = 200, description = "Refund issued", body = RefundResponse),
        (status = 400, description = "Invalid refund request", body = ErrorResponse),
        (status = 503, description = "Circuit breaker open for the venue", body = ErrorResponse),
    )
)]
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(charge_id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let venue_id = VenueId::new(req.venue_id);
    if venue_id.is_blank() {
        return Err(CoreError::InvalidRequest("venue_id is required".to_string()));
    }
    let refund = state.payments.refund(&venue_id, &charge_id, req.amount).await?;
    Ok(Json(RefundResponse::from(refund)))
}

/// `POST /webhooks/payments` — Apply a gateway status notification.
///
/// # Errors
///
/// Returns [`CoreError::PaymentNotFound`] for unknown charges and
/// [`CoreError::InvalidRequest`] for unknown statuses.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/payments",
    tag = "Payments",
    summary = "Payment status webhook",
    description = "Updates a recorded payment's status and the venue's metrics. Signatures are verified upstream.",
    request_body = PaymentWebhookRequest,
    responses(
        (status = 200, description = "Notification applied", body = PaymentResponse),
        (status = 400, description = "Unknown status", body = ErrorResponse),
        (status = 404, description = "Unknown charge", body = ErrorResponse),
    )
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    Json(req): Json<PaymentWebhookRequest>,
) -> Result<impl IntoResponse, CoreError> {
    let webhook = PaymentWebhook::try_from(req)?;
    let (key, result) = state.payments.apply_webhook(webhook).await?;
    Ok(Json(PaymentResponse::new(&key, result)))
}

/// `GET /venues/{venue_id}/payments/metrics` — Venue payment metrics.
#[utoipa::path(
    get,
    path = "/api/v1/venues/{venue_id}/payments/metrics",
    tag = "Payments",
    summary = "Venue payment metrics",
    params(("venue_id" = String, Path, description = "Venue identifier")),
    responses(
        (status = 200, description = "Metrics snapshot", body = PaymentMetricsResponse),
    )
)]
pub async fn venue_payment_metrics(
    State(state): State<AppState>,
    Path(venue_id): Path<String>,
) -> impl IntoResponse {
    let snapshot = state.payments.get_payment_metrics(&VenueId::new(venue_id)).await;
    Json(PaymentMetricsResponse::from(snapshot))
}

/// Payment routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments/{id}", get(get_payment))
        .route("/payments/{id}/refund", post(refund_payment))
        .route("/webhooks/payments", post(payment_webhook))
        .route("/venues/{venue_id}/payments/metrics", get(venue_payment_metrics))
}
