//! Process-wide feature flag registry.
//!
//! Reads are synchronous so that hot paths (payment lookups, optimization
//! decisions) can consult flags without awaiting. Lock poisoning is
//! recovered rather than propagated: a flag read must never fail.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::flag::{FeatureConfig, FeatureFlag};

/// Batch payment events for venues under load.
pub const MESSAGE_BATCHING: &str = "message_batching";
/// Compress batches for venues under critical load.
pub const COMPRESSION: &str = "compression";
/// Look up prior charges on the gateway before creating one.
pub const GATEWAY_LOOKUP: &str = "gateway_lookup";

/// Named feature flags, shared by every component.
#[derive(Debug, Default)]
pub struct FeatureManager {
    flags: RwLock<HashMap<String, FeatureFlag>>,
}

impl FeatureManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the flags the core consults, all enabled.
    #[must_use]
    pub fn with_defaults() -> Self {
        let manager = Self::new();
        manager.register_feature(
            MESSAGE_BATCHING,
            FeatureConfig::enabled("Batch venue payment events under load"),
        );
        manager.register_feature(
            COMPRESSION,
            FeatureConfig::enabled("Gzip batched events under critical load"),
        );
        manager.register_feature(
            GATEWAY_LOOKUP,
            FeatureConfig::enabled("Search gateway charges before creating a new one"),
        );
        manager
    }

    /// Forces the named flags on or off, registering unknown ones.
    pub fn apply_overrides(&self, enabled: &[String], disabled: &[String]) {
        for name in enabled {
            self.set_feature_state(name, true);
        }
        for name in disabled {
            self.set_feature_state(name, false);
        }
    }

    /// Registers or replaces a flag.
    pub fn register_feature(&self, name: &str, config: FeatureConfig) -> FeatureFlag {
        let flag = FeatureFlag::from_config(name, config);
        self.write().insert(name.to_string(), flag.clone());
        tracing::info!(feature = name, enabled = flag.enabled, "feature registered");
        flag
    }

    /// Returns whether `name` is on.
    ///
    /// Unknown flags are registered disabled and reported off.
    pub fn is_enabled(&self, name: &str) -> bool {
        if let Some(flag) = self.read().get(name) {
            return flag.enabled;
        }
        self.auto_register(name);
        false
    }

    /// Returns whether `name` is on for `entity` given its rollout.
    pub fn is_enabled_for(&self, name: &str, entity: &str) -> bool {
        if let Some(flag) = self.read().get(name) {
            return flag.applies_to(entity);
        }
        self.auto_register(name);
        false
    }

    /// Turns `name` on or off, registering it if unknown.
    pub fn set_feature_state(&self, name: &str, enabled: bool) -> FeatureFlag {
        let mut flags = self.write();
        let flag = flags
            .entry(name.to_string())
            .or_insert_with(|| FeatureFlag::from_config(name, FeatureConfig::default()));
        flag.enabled = enabled;
        flag.updated_at = Utc::now();
        tracing::info!(feature = name, enabled, "feature state changed");
        flag.clone()
    }

    /// Turns `name` on.
    pub fn enable(&self, name: &str) -> FeatureFlag {
        self.set_feature_state(name, true)
    }

    /// Turns `name` off.
    pub fn disable(&self, name: &str) -> FeatureFlag {
        self.set_feature_state(name, false)
    }

    /// Returns the flag named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<FeatureFlag> {
        self.read().get(name).cloned()
    }

    /// Returns every flag, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<FeatureFlag> {
        let mut flags: Vec<FeatureFlag> = self.read().values().cloned().collect();
        flags.sort_by(|a, b| a.name.cmp(&b.name));
        flags
    }

    fn auto_register(&self, name: &str) {
        let mut flags = self.write();
        if !flags.contains_key(name) {
            tracing::warn!(feature = name, "unknown feature consulted; registering as disabled");
            flags.insert(
                name.to_string(),
                FeatureFlag::from_config(name, FeatureConfig::default()),
            );
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, FeatureFlag>> {
        self.flags.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, FeatureFlag>> {
        self.flags.write().unwrap_or_else(PoisonError::into_inner)
    }
}
