//! Core error types with HTTP status code mapping.
//!
//! [`CoreError`] is the central error type for the payment core. Each
//! variant carries a stable string code that callers (and the JSON error
//! body) use to distinguish failure classes without parsing messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": "circuit_breaker_open",
///     "message": "circuit open for payment_gateway at venue v1; retry after 2400 ms",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with a stable code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable error code (e.g. `"max_retries_exceeded"`, `"card_declined"`).
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// An error reported by the payment gateway itself.
///
/// The code and message are kept verbatim so callers can tell a declined
/// card from a rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayFailure {
    /// Gateway error code (e.g. `"card_declined"`, `"rate_limited"`).
    pub code: String,
    /// Gateway error message.
    pub message: String,
    /// HTTP status returned by the gateway, when there was one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl GatewayFailure {
    /// Creates a failure with the given code and message.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Returns `true` when the gateway refused the card itself.
    #[must_use]
    pub fn is_card_decline(&self) -> bool {
        matches!(
            self.code.as_str(),
            "card_declined"
                | "insufficient_funds"
                | "expired_card"
                | "incorrect_cvc"
                | "incorrect_number"
                | "processing_error"
        )
    }
}

/// Core error enum.
///
/// # Error Codes
///
/// | Code                          | Retryable           | HTTP Status |
/// |-------------------------------|---------------------|-------------|
/// | `invalid_intent`              | no                  | 400         |
/// | `circuit_breaker_open`        | after backoff       | 503         |
/// | `half_open_attempts_exceeded` | after backoff       | 503         |
/// | `max_retries_exceeded`        | no (until reset)    | 409         |
/// | `gateway_timeout`             | after backoff       | 504         |
/// | gateway pass-through          | gateway-defined     | 402 / 429 / 502 |
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// The payment intent is malformed.
    #[error("invalid payment intent: {0}")]
    InvalidIntent(String),

    /// The breaker for this service and venue is open.
    #[error("circuit open for {service} at venue {venue_id}; retry after {retry_after_ms} ms")]
    CircuitOpen {
        /// Breaker service name.
        service: String,
        /// Venue the breaker guards.
        venue_id: String,
        /// Milliseconds until the breaker will admit a probe.
        retry_after_ms: u64,
    },

    /// A half-open breaker used up its probe budget and re-opened.
    #[error("half-open probe budget exhausted for {service} at venue {venue_id}")]
    HalfOpenAttemptsExceeded {
        /// Breaker service name.
        service: String,
        /// Venue the breaker guards.
        venue_id: String,
    },

    /// The idempotency key has used all of its attempts.
    #[error("max retries exceeded for idempotency key {key} after {attempts} attempts")]
    MaxRetriesExceeded {
        /// Idempotency key that was exhausted.
        key: String,
        /// Attempts already made.
        attempts: u32,
    },

    /// The gateway rejected the call.
    #[error("{}", .0.message)]
    Gateway(GatewayFailure),

    /// The gateway did not answer within the configured timeout.
    #[error("gateway call timed out after {0} ms")]
    GatewayTimeout(u64),

    /// No cached payment exists for the given key or charge.
    #[error("payment not found: {0}")]
    PaymentNotFound(String),

    /// No breaker exists for the given service and venue.
    #[error("breaker not found for {service} at venue {venue_id}")]
    BreakerNotFound {
        /// Breaker service name.
        service: String,
        /// Venue identifier.
        venue_id: String,
    },

    /// The venue has no optimization profile.
    #[error("no optimization profile for venue {0}")]
    ProfileNotFound(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns the stable error code for this variant.
    ///
    /// Gateway errors return the gateway's own code.
    #[must_use]
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidIntent(_) => "invalid_intent",
            Self::CircuitOpen { .. } => "circuit_breaker_open",
            Self::HalfOpenAttemptsExceeded { .. } => "half_open_attempts_exceeded",
            Self::MaxRetriesExceeded { .. } => "max_retries_exceeded",
            Self::Gateway(failure) => &failure.code,
            Self::GatewayTimeout(_) => "gateway_timeout",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::BreakerNotFound { .. } => "breaker_not_found",
            Self::ProfileNotFound(_) => "profile_not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::PersistenceError(_) => "persistence_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Returns `true` for failures that a caller may retry after backing off.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitOpen { .. }
            | Self::HalfOpenAttemptsExceeded { .. }
            | Self::GatewayTimeout(_) => true,
            Self::Gateway(failure) => matches!(failure.status, Some(429) | Some(500..=599)),
            _ => false,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidIntent(_) | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::CircuitOpen { .. } | Self::HalfOpenAttemptsExceeded { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::MaxRetriesExceeded { .. } => StatusCode::CONFLICT,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Gateway(failure) => match failure.status {
                Some(429) => StatusCode::TOO_MANY_REQUESTS,
                Some(402) => StatusCode::PAYMENT_REQUIRED,
                Some(status) if (400..500).contains(&status) => StatusCode::PAYMENT_REQUIRED,
                None if failure.is_card_decline() => StatusCode::PAYMENT_REQUIRED,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::PaymentNotFound(_) | Self::BreakerNotFound { .. } | Self::ProfileNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = match &self {
            Self::CircuitOpen { retry_after_ms, .. } => Some(format!("retry_after_ms={retry_after_ms}")),
            _ => None,
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code().to_string(),
                message: self.to_string(),
                details,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
