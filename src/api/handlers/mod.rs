//! REST endpoint handlers organized by resource.

pub mod breakers;
pub mod features;
pub mod payments;
pub mod system;
pub mod venues;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(payments::routes())
        .merge(breakers::routes())
        .merge(venues::routes())
        .merge(features::routes())
}
