//! Feature flag handlers.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};

use crate::app_state::AppState;
use crate::error::{CoreError, ErrorResponse};
use crate::features::{FeatureConfig, FeatureFlag};

/// `GET /features` — List feature flags.
#[utoipa::path(
    get,
    path = "/api/v1/features",
    tag = "Features",
    summary = "List feature flags",
    responses(
        (status = 200, description = "Flags sorted by name", body = Vec<FeatureFlag>),
    )
)]
pub async fn list_features(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.features.list())
}

/// `PUT /features/{name}` — Register or replace a feature flag.
///
/// # Errors
///
/// Returns [`CoreError::InvalidRequest`] for a blank name or a rollout
/// percentage above 100.
#[utoipa::path(
    put,
    path = "/api/v1/features/{name}",
    tag = "Features",
    summary = "Register feature flag",
    params(("name" = String, Path, description = "Feature name")),
    request_body = FeatureConfig,
    responses(
        (status = 200, description = "Registered flag", body = FeatureFlag),
        (status = 400, description = "Invalid flag settings", body = ErrorResponse),
    )
)]
pub async fn put_feature(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(config): Json<FeatureConfig>,
) -> Result<impl IntoResponse, CoreError> {
    if name.trim().is_empty() {
        return Err(CoreError::InvalidRequest("feature name is required".to_string()));
    }
    if config.rollout_percentage > 100 {
        return Err(CoreError::InvalidRequest(format!(
            "rollout_percentage must be 0-100, got {}",
            config.rollout_percentage
        )));
    }
    Ok(Json(state.features.register_feature(&name, config)))
}

/// `POST /features/{name}/enable` — Turn a flag on.
#[utoipa::path(
    post,
    path = "/api/v1/features/{name}/enable",
    tag = "Features",
    summary = "Enable feature flag",
    params(("name" = String, Path, description = "Feature name")),
    responses(
        (status = 200, description = "Updated flag", body = FeatureFlag),
    )
)]
pub async fn enable_feature(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(state.features.enable(&name))
}

/// `POST /features/{name}/disable` — Turn a flag off.
#[utoipa::path(
    post,
    path = "/api/v1/features/{name}/disable",
    tag = "Features",
    summary = "Disable feature flag",
    params(("name" = String, Path, description = "Feature name")),
    responses(
        (status = 200, description = "Updated flag", body = FeatureFlag),
    )
)]
pub async fn disable_feature(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    Json(state.features.disable(&name))
}

/// Feature routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/features", get(list_features))
        .route("/features/{name}", put(put_feature))
        .route("/features/{name}/enable", post(enable_feature))
        .route("/features/{name}/disable", post(disable_feature))
}
