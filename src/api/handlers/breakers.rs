//! Circuit breaker handlers: list, inspect, trip, reset.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{BreakerListResponse, BreakerResponse, VenueFilter};
use crate::app_state::AppState;
use crate::domain::VenueId;
use crate::error::{CoreError, ErrorResponse};

/// `GET /breakers` — List every breaker.
#[utoipa::path(
    get,
    path = "/api/v1/breakers",
    tag = "Breakers",
    summary = "List breakers",
    description = "Returns every `(service, venue)` breaker with its call metrics, optionally filtered by venue.",
    params(VenueFilter),
    responses(
        (status = 200, description = "Breaker list", body = BreakerListResponse),
    )
)]
pub async fn list_breakers(
    State(state): State<AppState>,
    Query(filter): Query<VenueFilter>,
) -> impl IntoResponse {
    let data: Vec<BreakerResponse> = state
        .breaker
        .list()
        .await
        .into_iter()
        .filter(|snapshot| {
            filter
                .venue_id
                .as_deref()
                .is_none_or(|venue| snapshot.venue_id.as_str() == venue)
        })
        .map(BreakerResponse::from)
        .collect();
    let total = data.len();
    Json(BreakerListResponse { data, total })
}

/// `GET /breakers/{service}/{venue_id}` — Inspect one breaker.
#[utoipa::path(
    get,
    path = "/api/v1/breakers/{service}/{venue_id}",
    tag = "Breakers",
    summary = "Get breaker state",
    description = "Applies the lazy open → half-open check before reporting. Unknown pairs report a fresh closed breaker.",
    params(
        ("service" = String, Path, description = "Service name"),
        ("venue_id" = String, Path, description = "Venue identifier"),
    ),
    responses(
        (status = 200, description = "Breaker state", body = BreakerResponse),
    )
)]
pub async fn get_breaker(
    State(state): State<AppState>,
    Path((service, venue_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let snapshot = state.breaker.get_state(&service, &VenueId::new(venue_id)).await;
    Json(BreakerResponse::from(snapshot))
}

/// `POST /breakers/{service}/{venue_id}/trip` — Force a breaker open.
#[utoipa::path(
    post,
    path = "/api/v1/breakers/{service}/{venue_id}/trip",
    tag = "Breakers",
    summary = "Trip breaker",
    params(
        ("service" = String, Path, description = "Service name"),
        ("venue_id" = String, Path, description = "Venue identifier"),
    ),
    responses(
        (status = 200, description = "Breaker opened", body = BreakerResponse),
    )
)]
pub async fn trip_breaker(
    State(state): State<AppState>,
    Path((service, venue_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let snapshot = state.breaker.trip(&service, &VenueId::new(venue_id)).await;
    Json(BreakerResponse::from(snapshot))
}

/// `POST /breakers/{service}/{venue_id}/reset` — Force a breaker closed.
///
/// # Errors
///
/// Returns [`CoreError::BreakerNotFound`] if the breaker does not exist.
#[utoipa::path(
    post,
    path = "/api/v1/breakers/{service}/{venue_id}/reset",
    tag = "Breakers",
    summary = "Reset breaker",
    params(
        ("service" = String, Path, description = "Service name"),
        ("venue_id" = String, Path, description = "Venue identifier"),
    ),
    responses(
        (status = 200, description = "Breaker closed", body = BreakerResponse),
        (status = 404, description = "Breaker not found", body = ErrorResponse),
    )
)]
pub async fn reset_breaker(
    State(state): State<AppState>,
    Path((service, venue_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, CoreError> {
    let snapshot = state.breaker.reset(&service, &VenueId::new(venue_id)).await?;
    Ok(Json(BreakerResponse::from(snapshot)))
}

/// Breaker routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/breakers", get(list_breakers))
        .route("/breakers/{service}/{venue_id}", get(get_breaker))
        .route("/breakers/{service}/{venue_id}/trip", post(trip_breaker))
        .route("/breakers/{service}/{venue_id}/reset", post(reset_breaker))
}
