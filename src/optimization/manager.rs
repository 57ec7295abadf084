//! Load-adaptive channel optimizations.
//!
//! [`OptimizationManager`] keeps one [`OptimizationProfile`] per venue,
//! plus a batch queue and a flush timer for venues with batching on. All
//! three live under one lock, so `cleanup` racing `enable_*` resolves to
//! whichever ran last and never leaves a timer without its profile.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::batch::encode_batch;
use super::profile::{OptimizationDecision, OptimizationProfile, load_level, should_optimize};
use crate::config::OptimizationConfig;
use crate::domain::{CoreEvent, EventBus, LoadLevel, VenueId, VenueMetrics};
use crate::error::CoreError;
use crate::features::{COMPRESSION, FeatureManager, MESSAGE_BATCHING};

#[derive(Debug, Default)]
struct VenueChannels {
    profiles: HashMap<VenueId, OptimizationProfile>,
    queues: HashMap<VenueId, Vec<Value>>,
    timers: HashMap<VenueId, JoinHandle<()>>,
}

/// Per-venue optimization state.
#[derive(Debug)]
pub struct OptimizationManager {
    config: OptimizationConfig,
    features: Arc<FeatureManager>,
    event_bus: EventBus,
    channels: Arc<Mutex<VenueChannels>>,
}

impl OptimizationManager {
    /// Creates a manager with no active profiles.
    #[must_use]
    pub fn new(config: OptimizationConfig, features: Arc<FeatureManager>, event_bus: EventBus) -> Self {
        Self {
            config,
            features,
            event_bus,
            channels: Arc::new(Mutex::new(VenueChannels::default())),
        }
    }

    /// Returns the manager configuration.
    #[must_use]
    pub fn config(&self) -> &OptimizationConfig {
        &self.config
    }

    /// Decides which optimizations `metrics` warrant.
    #[must_use]
    pub fn should_optimize(&self, metrics: &VenueMetrics) -> OptimizationDecision {
        should_optimize(metrics, &self.config)
    }

    /// Applies the optimizations a load sample calls for.
    ///
    /// Crossing a threshold publishes [`CoreEvent::ThresholdReached`].
    /// Each optimization is gated by its feature flag for the venue.
    /// Returns the venue's profile, if it has one.
    pub async fn optimize(&self, metrics: &VenueMetrics) -> Option<OptimizationProfile> {
        let venue_id = &metrics.venue_id;
        let decision = self.should_optimize(metrics);
        if decision.level != LoadLevel::Normal {
            tracing::info!(
                %venue_id,
                connections = metrics.connections,
                level = decision.level.as_str(),
                "load threshold reached"
            );
            self.event_bus.publish(CoreEvent::ThresholdReached {
                venue_id: venue_id.clone(),
                level: decision.level,
                connections: metrics.connections,
                timestamp: Utc::now(),
            });
        }

        if decision.batching && self.features.is_enabled_for(MESSAGE_BATCHING, venue_id.as_str()) {
            self.enable_message_batching(venue_id).await;
        }
        if decision.compression && self.features.is_enabled_for(COMPRESSION, venue_id.as_str()) {
            self.enable_compression(venue_id).await;
        }

        let mut channels = self.channels.lock().await;
        let profile = channels.profiles.get_mut(venue_id)?;
        profile.load_level = decision.level;
        Some(profile.clone())
    }

    /// Turns on message batching for `venue_id`. Idempotent.
    pub async fn enable_message_batching(&self, venue_id: &VenueId) -> OptimizationProfile {
        let mut channels = self.channels.lock().await;
        let profile = self.profile_mut(&mut channels, venue_id);
        if !profile.batching_enabled {
            profile.batching_enabled = true;
            profile.updated_at = Utc::now();
            tracing::info!(%venue_id, "message batching enabled");
        }
        let snapshot = profile.clone();
        self.ensure_flush_timer(&mut channels, venue_id);
        snapshot
    }

    /// Turns on batch compression (and batching) for `venue_id`. Idempotent.
    pub async fn enable_compression(&self, venue_id: &VenueId) -> OptimizationProfile {
        let mut channels = self.channels.lock().await;
        let profile = self.profile_mut(&mut channels, venue_id);
        if !profile.compression_enabled || !profile.batching_enabled {
            profile.batching_enabled = true;
            profile.compression_enabled = true;
            profile.updated_at = Utc::now();
            tracing::info!(%venue_id, level = profile.compression_level, "compression enabled");
        }
        let snapshot = profile.clone();
        self.ensure_flush_timer(&mut channels, venue_id);
        snapshot
    }

    /// Tightens `venue_id` while `service` is failing: forces batching and
    /// shrinks the pool multiplier.
    pub async fn handle_breaker_open(&self, venue_id: &VenueId, service: &str) -> OptimizationProfile {
        let mut channels = self.channels.lock().await;
        let profile = self.profile_mut(&mut channels, venue_id);
        profile.open_services.insert(service.to_string());
        profile.emergency = true;
        profile.batching_enabled = true;
        profile.pool_multiplier = self.config.emergency_pool_multiplier;
        profile.updated_at = Utc::now();
        tracing::warn!(
            %venue_id,
            service,
            pool_multiplier = profile.pool_multiplier,
            "emergency optimizations applied"
        );
        let snapshot = profile.clone();
        self.ensure_flush_timer(&mut channels, venue_id);
        snapshot
    }

    /// Marks `service` recovered for `venue_id` and lifts the emergency
    /// restrictions once no service remains open. Load-driven
    /// optimizations stay; a venue with normal load loses its profile
    /// entirely.
    pub async fn handle_service_recovery(&self, venue_id: &VenueId, service: &str) -> Option<OptimizationProfile> {
        let mut channels = self.channels.lock().await;
        let profile = channels.profiles.get_mut(venue_id)?;
        profile.open_services.remove(service);
        if !profile.emergency {
            return Some(profile.clone());
        }
        if !profile.open_services.is_empty() {
            tracing::info!(
                %venue_id,
                service,
                still_open = profile.open_services.len(),
                "service recovered; emergency kept for other services"
            );
            return Some(profile.clone());
        }
        tracing::info!(%venue_id, service, "service recovered; lifting emergency optimizations");
        if profile.load_level == LoadLevel::Normal {
            remove_venue(&mut channels, venue_id);
            return None;
        }
        profile.emergency = false;
        profile.pool_multiplier = 1.0;
        profile.compression_enabled =
            profile.compression_enabled && profile.load_level >= LoadLevel::Critical;
        profile.updated_at = Utc::now();
        Some(profile.clone())
    }

    /// Removes the profile, batch queue, and flush timer of `venue_id`.
    pub async fn cleanup(&self, venue_id: &VenueId) -> bool {
        let mut channels = self.channels.lock().await;
        let removed = remove_venue(&mut channels, venue_id);
        if removed {
            tracing::info!(%venue_id, "venue optimizations cleaned up");
        }
        removed
    }

    /// Queues `message` for the next batch if `venue_id` batches.
    ///
    /// Returns `false` when the venue is not batching and the caller
    /// should deliver the message directly.
    pub async fn enqueue(&self, venue_id: &VenueId, message: Value) -> bool {
        let mut channels = self.channels.lock().await;
        if !channels.profiles.get(venue_id).is_some_and(|p| p.batching_enabled) {
            return false;
        }
        channels.queues.entry(venue_id.clone()).or_default().push(message);
        true
    }

    /// Flushes the queue of `venue_id` now, returning the batch size.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Internal`] if the batch cannot be encoded.
    pub async fn flush(&self, venue_id: &VenueId) -> Result<usize, CoreError> {
        flush_queue(&self.channels, &self.event_bus, venue_id).await
    }

    /// Returns `true` if payment events for `venue_id` are batched.
    pub async fn is_batching(&self, venue_id: &VenueId) -> bool {
        self.channels
            .lock()
            .await
            .profiles
            .get(venue_id)
            .is_some_and(|p| p.batching_enabled)
    }

    /// Returns the profile for `venue_id`.
    pub async fn get_profile(&self, venue_id: &VenueId) -> Option<OptimizationProfile> {
        self.channels.lock().await.profiles.get(venue_id).cloned()
    }

    /// Returns every profile, sorted by venue.
    pub async fn profiles(&self) -> Vec<OptimizationProfile> {
        let mut profiles: Vec<OptimizationProfile> =
            self.channels.lock().await.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.venue_id.cmp(&b.venue_id));
        profiles
    }

    /// Returns `true` if `venue_id` has a batch queue.
    pub async fn has_batch_queue(&self, venue_id: &VenueId) -> bool {
        self.channels.lock().await.queues.contains_key(venue_id)
    }

    /// Returns `true` if `venue_id` has a running flush timer.
    pub async fn has_flush_timer(&self, venue_id: &VenueId) -> bool {
        self.channels.lock().await.timers.contains_key(venue_id)
    }

    /// Classifies `connections` against the configured thresholds.
    #[must_use]
    pub fn load_level(&self, connections: u64) -> LoadLevel {
        load_level(connections, &self.config)
    }

    fn profile_mut<'a>(
        &self,
        channels: &'a mut VenueChannels,
        venue_id: &VenueId,
    ) -> &'a mut OptimizationProfile {
        channels
            .profiles
            .entry(venue_id.clone())
            .or_insert_with(|| OptimizationProfile::new(venue_id.clone(), &self.config))
    }

    fn ensure_flush_timer(&self, channels: &mut VenueChannels, venue_id: &VenueId) {
        channels.queues.entry(venue_id.clone()).or_default();
        if channels.timers.get(venue_id).is_some_and(|t| !t.is_finished()) {
            return;
        }
        let shared = Arc::clone(&self.channels);
        let bus = self.event_bus.clone();
        let venue = venue_id.clone();
        let period = self.config.batch_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(err) = flush_queue(&shared, &bus, &venue).await {
                    tracing::warn!(venue_id = %venue, error = %err, "batch flush failed");
                }
            }
        });
        if let Some(previous) = channels.timers.insert(venue_id.clone(), handle) {
            previous.abort();
        }
    }
}

impl Drop for OptimizationManager {
    fn drop(&mut self) {
        if let Ok(mut channels) = self.channels.try_lock() {
            for (_, timer) in channels.timers.drain() {
                timer.abort();
            }
        }
    }
}

fn remove_venue(channels: &mut VenueChannels, venue_id: &VenueId) -> bool {
    let profile = channels.profiles.remove(venue_id).is_some();
    let queue = channels.queues.remove(venue_id).is_some();
    let timer = match channels.timers.remove(venue_id) {
        Some(handle) => {
            handle.abort();
            true
        }
        None => false,
    };
    profile || queue || timer
}

async fn flush_queue(
    channels: &Mutex<VenueChannels>,
    bus: &EventBus,
    venue_id: &VenueId,
) -> Result<usize, CoreError> {
    let (messages, compression) = {
        let mut channels = channels.lock().await;
        let compression = channels
            .profiles
            .get(venue_id)
            .filter(|p| p.compression_enabled)
            .map(|p| p.compression_level);
        let Some(queue) = channels.queues.get_mut(venue_id) else {
            return Ok(0);
        };
        if queue.is_empty() {
            return Ok(0);
        }
        (std::mem::take(queue), compression)
    };
    let count = messages.len();
    let (encoding, payload) = encode_batch(messages, compression)?;
    bus.publish(CoreEvent::MessageBatch {
        venue_id: venue_id.clone(),
        count,
        encoding,
        payload,
        timestamp: Utc::now(),
    });
    tracing::debug!(%venue_id, count, "batch flushed");
    Ok(count)
}
