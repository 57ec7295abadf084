//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Result of an administrative action.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionResponse {
    /// Action performed (e.g. `"cleanup"`).
    pub action: String,
    /// Target of the action.
    pub target: String,
    /// Whether anything changed.
    pub changed: bool,
}

/// Optional venue filter for list endpoints.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct VenueFilter {
    /// Only return entries for this venue.
    #[serde(default)]
    pub venue_id: Option<String>,
}
