//! Feature flag records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Registration settings for a feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FeatureConfig {
    /// Whether the feature is on.
    #[serde(default)]
    pub enabled: bool,
    /// Share of entities (0-100) the feature applies to when enabled.
    #[serde(default = "full_rollout")]
    pub rollout_percentage: u8,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
}

const fn full_rollout() -> u8 {
    100
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rollout_percentage: full_rollout(),
            description: String::new(),
        }
    }
}

impl FeatureConfig {
    /// An enabled feature at full rollout.
    #[must_use]
    pub fn enabled(description: impl Into<String>) -> Self {
        Self {
            enabled: true,
            rollout_percentage: full_rollout(),
            description: description.into(),
        }
    }
}

/// A named feature flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FeatureFlag {
    /// Flag name.
    pub name: String,
    /// Whether the flag is on.
    pub enabled: bool,
    /// Share of entities (0-100) the flag applies to when on.
    pub rollout_percentage: u8,
    /// Free-form description.
    pub description: String,
    /// Last change time.
    pub updated_at: DateTime<Utc>,
}

impl FeatureFlag {
    /// Builds a flag from its registration settings.
    #[must_use]
    pub fn from_config(name: impl Into<String>, config: FeatureConfig) -> Self {
        Self {
            name: name.into(),
            enabled: config.enabled,
            rollout_percentage: config.rollout_percentage.min(100),
            description: config.description,
            updated_at: Utc::now(),
        }
    }

    /// Returns `true` if the flag is on for `entity`.
    ///
    /// Entities land in a fixed bucket in `0..100` derived from the flag
    /// name and entity, so raising the percentage only ever adds entities.
    #[must_use]
    pub fn applies_to(&self, entity: &str) -> bool {
        if !self.enabled {
            return false;
        }
        if self.rollout_percentage >= 100 {
            return true;
        }
        rollout_bucket(&self.name, entity) < self.rollout_percentage
    }
}

/// Deterministic bucket in `0..100` for `(feature, entity)`.
#[must_use]
pub fn rollout_bucket(feature: &str, entity: &str) -> u8 {
    let digest = Sha256::new()
        .chain_update(feature.as_bytes())
        .chain_update(b":")
        .chain_update(entity.as_bytes())
        .finalize();
    let mut prefix = [0_u8; 8];
    for (dst, src) in prefix.iter_mut().zip(digest.iter()) {
        *dst = *src;
    }
    #[allow(clippy::cast_possible_truncation)]
    let bucket = (u64::from_be_bytes(prefix) % 100) as u8;
    bucket
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_is_stable_and_bounded() {
        let first = rollout_bucket("compression", "v1");
        assert_eq!(first, rollout_bucket("compression", "v1"));
        for venue in ["v1", "v2", "v3", "stadium-9"] {
            assert!(rollout_bucket("message_batching", venue) < 100);
        }
    }

    #[test]
    fn zero_percent_applies_to_nobody() {
        let flag = FeatureFlag::from_config(
            "compression",
            FeatureConfig {
                enabled: true,
                rollout_percentage: 0,
                description: String::new(),
            },
        );
        assert!(!flag.applies_to("v1"));
        assert!(!flag.applies_to("v2"));
    }

    #[test]
    fn disabled_flag_ignores_rollout() {
        let flag = FeatureFlag::from_config("compression", FeatureConfig::default());
        assert!(!flag.applies_to("v1"));
    }

    #[test]
    fn rollout_is_clamped() {
        let flag = FeatureFlag::from_config(
            "x",
            FeatureConfig {
                enabled: true,
                rollout_percentage: 250,
                description: String::new(),
            },
        );
        assert_eq!(flag.rollout_percentage, 100);
        assert!(flag.applies_to("anyone"));
    }
}
