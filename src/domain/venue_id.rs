//! Type-safe venue identifier.
//!
//! [`VenueId`] is a newtype wrapper around the venue's external string ID so
//! venue keys cannot be confused with customer IDs, charge IDs, or service
//! names in the many venue-keyed maps of the core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a venue.
///
/// All failure and load state in the core is partitioned by this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(String);

impl VenueId {
    /// Creates a `VenueId` from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the ID is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Short uppercase venue code used to prefix idempotency keys.
    ///
    /// Takes the first four ASCII alphanumeric characters; falls back to
    /// `"VEN"` when the ID has none.
    #[must_use]
    pub fn short_code(&self) -> String {
        let code: String = self
            .0
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(4)
            .map(|c| c.to_ascii_uppercase())
            .collect();
        if code.is_empty() {
            "VEN".to_string()
        } else {
            code
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for VenueId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_code_uppercases_alphanumerics() {
        assert_eq!(VenueId::new("club-nova-42").short_code(), "CLUB");
        assert_eq!(VenueId::new("a-1").short_code(), "A1");
    }

    #[test]
    fn short_code_falls_back_when_empty() {
        assert_eq!(VenueId::new("--").short_code(), "VEN");
    }

    #[test]
    fn blank_detection() {
        assert!(VenueId::new("  ").is_blank());
        assert!(!VenueId::new("v1").is_blank());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&VenueId::new("v1")).unwrap_or_default();
        assert_eq!(json, "\"v1\"");
    }
}
