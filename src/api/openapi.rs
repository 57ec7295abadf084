//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use crate::api::dto::{
    ActionResponse, BreakerListResponse, BreakerResponse, CallMetricsDto, CreatePaymentRequest,
    OptimizationDecisionDto, OptimizationProfileDto, PaymentMetricsResponse, PaymentResponse,
    PaymentWebhookRequest, RefundRequest, RefundResponse, VenueLoadResponse,
};
use crate::api::handlers::{breakers, features, payments, system, venues};
use crate::error::{ErrorBody, ErrorResponse};
use crate::features::{FeatureConfig, FeatureFlag};

/// Aggregated OpenAPI document.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "venue-payments",
        description = "Venue-aware payment orchestration API"
    ),
    paths(
        system::health_handler,
        payments::create_payment,
        payments::get_payment,
        payments::refund_payment,
        payments::payment_webhook,
        payments::venue_payment_metrics,
        breakers::list_breakers,
        breakers::get_breaker,
        breakers::trip_breaker,
        breakers::reset_breaker,
        venues::venue_load,
        venues::get_optimization,
        venues::cleanup_optimization,
        features::list_features,
        features::put_feature,
        features::enable_feature,
        features::disable_feature
    ),
    components(schemas(
        ErrorResponse,
        ErrorBody,
        CreatePaymentRequest,
        PaymentResponse,
        RefundRequest,
        RefundResponse,
        PaymentWebhookRequest,
        PaymentMetricsResponse,
        BreakerResponse,
        BreakerListResponse,
        CallMetricsDto,
        VenueLoadResponse,
        OptimizationDecisionDto,
        OptimizationProfileDto,
        ActionResponse,
        FeatureConfig,
        FeatureFlag,
        system::HealthResponse
    )),
    tags(
        (name = "System", description = "Health"),
        (name = "Payments", description = "Payment processing, refunds, and webhooks"),
        (name = "Breakers", description = "Per-venue circuit breakers"),
        (name = "Venues", description = "Venue load and channel optimizations"),
        (name = "Features", description = "Feature flags")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_payment_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/payments"));
        assert!(doc.paths.paths.contains_key("/api/v1/breakers/{service}/{venue_id}/reset"));
        assert!(doc.paths.paths.contains_key("/health"));
    }
}
