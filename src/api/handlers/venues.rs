//! Venue load and optimization handlers.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ActionResponse, OptimizationProfileDto, VenueLoadResponse};
use crate::app_state::AppState;
use crate::domain::VenueId;
use crate::error::{CoreError, ErrorResponse};

/// `GET /venues/{venue_id}/load` — Sample load and apply optimizations.
///
/// # Errors
///
/// Returns [`CoreError`] if the transport cannot be sampled.
#[utoipa::path(
    get,
    path = "/api/v1/venues/{venue_id}/load",
    tag = "Venues",
    summary = "Sample venue load",
    description = "Samples the venue's real-time connections and applies whatever optimizations the sample calls for.",
    params(("venue_id" = String, Path, description = "Venue identifier")),
    responses(
        (status = 200, description = "Load sample and resulting profile", body = VenueLoadResponse),
        (status = 500, description = "Sampling failed", body = ErrorResponse),
    )
)]
pub async fn venue_load(
    State(state): State<AppState>,
    Path(venue_id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let venue_id = VenueId::new(venue_id);
    let metrics = state.load_monitor.track_venue(&venue_id).await?;
    let decision = state.optimization.should_optimize(&metrics);
    let profile = state.optimization.optimize(&metrics).await;
    Ok(Json(VenueLoadResponse {
        venue_id: venue_id.to_string(),
        connections: metrics.connections,
        message_rate: metrics.message_rate,
        sampled_at: metrics.sampled_at,
        decision: decision.into(),
        profile: profile.map(OptimizationProfileDto::from),
    }))
}

/// `GET /venues/{venue_id}/optimization` — Current optimization profile.
///
/// # Errors
///
/// Returns [`CoreError::ProfileNotFound`] if the venue has no profile.
#[utoipa::path(
    get,
    path = "/api/v1/venues/{venue_id}/optimization",
    tag = "Venues",
    summary = "Get optimization profile",
    params(("venue_id" = String, Path, description = "Venue identifier")),
    responses(
        (status = 200, description = "Active profile", body = OptimizationProfileDto),
        (status = 404, description = "Venue has no profile", body = ErrorResponse),
    )
)]
pub async fn get_optimization(
    State(state): State<AppState>,
    Path(venue_id): Path<String>,
) -> Result<impl IntoResponse, CoreError> {
    let venue_id = VenueId::new(venue_id);
    let profile = state
        .optimization
        .get_profile(&venue_id)
        .await
        .ok_or_else(|| CoreError::ProfileNotFound(venue_id.to_string()))?;
    Ok(Json(OptimizationProfileDto::from(profile)))
}

/// `DELETE /venues/{venue_id}/optimization` — Remove a venue's profile,
/// batch queue, and flush timer.
#[utoipa::path(
    delete,
    path = "/api/v1/venues/{venue_id}/optimization",
    tag = "Venues",
    summary = "Clean up venue optimizations",
    params(("venue_id" = String, Path, description = "Venue identifier")),
    responses(
        (status = 200, description = "Cleanup result", body = ActionResponse),
    )
)]
pub async fn cleanup_optimization(
    State(state): State<AppState>,
    Path(venue_id): Path<String>,
) -> impl IntoResponse {
    let venue_id = VenueId::new(venue_id);
    let changed = state.optimization.cleanup(&venue_id).await;
    Json(ActionResponse {
        action: "cleanup".to_string(),
        target: venue_id.to_string(),
        changed,
    })
}

/// Venue routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/venues/{venue_id}/load", get(venue_load))
        .route(
            "/venues/{venue_id}/optimization",
            get(get_optimization).delete(cleanup_optimization),
        )
}
