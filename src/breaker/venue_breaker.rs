//! Circuit breakers partitioned by service and venue.
//!
//! [`VenueAwareBreaker`] keeps one [`Circuit`] per `(service, venue)` pair
//! so that one venue's failures never open the breaker for another venue
//! sharing the same backend. Entries are created lazily on first call and
//! live until reset. State transitions happen inside calling requests; no
//! background task is involved.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::state::{BreakerState, Circuit, Rejection};
use crate::config::BreakerConfig;
use crate::domain::{CoreEvent, EventBus, VenueId};
use crate::error::CoreError;

/// Call statistics for one breaker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CallMetrics {
    /// Calls that reached the wrapped function.
    pub total_calls: u64,
    /// Calls that returned `Ok`.
    pub successful_calls: u64,
    /// Calls that returned `Err`.
    pub failed_calls: u64,
    /// Running mean of call latency.
    pub avg_response_time_ms: f64,
}

impl CallMetrics {
    fn record(&mut self, elapsed: Duration, success: bool) {
        self.total_calls = self.total_calls.saturating_add(1);
        if success {
            self.successful_calls = self.successful_calls.saturating_add(1);
        } else {
            self.failed_calls = self.failed_calls.saturating_add(1);
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.total_calls as f64;
        let sample = elapsed.as_secs_f64() * 1_000.0;
        self.avg_response_time_ms += (sample - self.avg_response_time_ms) / n;
    }
}

/// Read-only view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    /// Breaker service name.
    pub service: String,
    /// Venue the breaker guards.
    pub venue_id: VenueId,
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failures.
    pub failures: u32,
    /// Successes in the current state.
    pub successes: u32,
    /// Time of the most recent failure.
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Probe calls admitted since the last close.
    pub half_open_attempts: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// Milliseconds until an open breaker admits a probe.
    pub retry_after_ms: u64,
    /// Call statistics.
    pub metrics: CallMetrics,
}

#[derive(Debug, Default)]
struct BreakerEntry {
    circuit: Circuit,
    metrics: CallMetrics,
}

/// A half-open slot held by an in-flight call; handed back if the call is
/// dropped before it reports an outcome.
#[derive(Debug)]
struct HalfOpenSlot {
    entry: Option<Arc<Mutex<BreakerEntry>>>,
}

impl HalfOpenSlot {
    fn disarm(&mut self) {
        self.entry = None;
    }
}

impl Drop for HalfOpenSlot {
    fn drop(&mut self) {
        let Some(entry) = self.entry.take() else {
            return;
        };
        if let Ok(mut guard) = entry.try_lock() {
            guard.circuit.release_half_open_slot();
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                entry.lock().await.circuit.release_half_open_slot();
            });
        }
    }
}

type BreakerKey = (String, VenueId);

/// Per-`(service, venue)` circuit breaker registry.
///
/// # Concurrency
///
/// The outer map is behind a `RwLock`; each entry has its own `Mutex`.
/// Entry locks are never held while the wrapped call runs, so slow calls
/// on one venue do not block admission checks on the same venue.
#[derive(Debug)]
pub struct VenueAwareBreaker {
    config: BreakerConfig,
    event_bus: EventBus,
    entries: RwLock<HashMap<BreakerKey, Arc<Mutex<BreakerEntry>>>>,
}

impl VenueAwareBreaker {
    /// Creates an empty breaker registry.
    #[must_use]
    pub fn new(config: BreakerConfig, event_bus: EventBus) -> Self {
        Self {
            config,
            event_bus,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the breaker configuration.
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Runs `call` through the breaker for `(service, venue_id)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CircuitOpen`] if the breaker is open and the
    /// reset timeout has not elapsed, [`CoreError::HalfOpenAttemptsExceeded`]
    /// if the half-open probe budget is spent, and otherwise whatever error
    /// `call` returned, unchanged.
    pub async fn execute<T, F, Fut>(
        &self,
        service: &str,
        venue_id: &VenueId,
        call: F,
    ) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let entry = self.entry(service, venue_id).await;

        let (admission, circuit) = {
            let mut guard = entry.lock().await;
            let admission = guard.circuit.admit(Utc::now(), &self.config);
            (admission, guard.circuit.clone())
        };
        for state in &admission.transitions {
            self.publish_transition(service, venue_id, *state, &circuit);
        }

        match admission.rejection {
            Some(Rejection::Open { retry_after }) => {
                tracing::debug!(service, %venue_id, "call rejected: circuit open");
                return Err(CoreError::CircuitOpen {
                    service: service.to_string(),
                    venue_id: venue_id.to_string(),
                    retry_after_ms: duration_ms(retry_after),
                });
            }
            Some(Rejection::HalfOpenAttemptsExceeded) => {
                tracing::warn!(service, %venue_id, "half-open probe budget exhausted");
                return Err(CoreError::HalfOpenAttemptsExceeded {
                    service: service.to_string(),
                    venue_id: venue_id.to_string(),
                });
            }
            None => {}
        }

        let mut slot = HalfOpenSlot {
            entry: (circuit.state == BreakerState::HalfOpen).then(|| Arc::clone(&entry)),
        };
        let started = Instant::now();
        let outcome = call().await;
        let elapsed = started.elapsed();
        slot.disarm();

        let (transition, circuit) = {
            let mut guard = entry.lock().await;
            guard.metrics.record(elapsed, outcome.is_ok());
            let transition = match &outcome {
                Ok(_) => guard.circuit.record_success(&self.config),
                Err(err) => guard
                    .circuit
                    .record_failure(err.to_string(), Utc::now(), &self.config),
            };
            (transition, guard.circuit.clone())
        };
        if let Some(state) = transition {
            self.publish_transition(service, venue_id, state, &circuit);
        }

        outcome
    }

    /// Returns a snapshot of the breaker, applying the lazy
    /// `open → half_open` check first.
    ///
    /// Unknown pairs report a fresh closed breaker without creating one.
    pub async fn get_state(&self, service: &str, venue_id: &VenueId) -> BreakerSnapshot {
        let existing = {
            let map = self.entries.read().await;
            map.get(&(service.to_string(), venue_id.clone())).cloned()
        };
        match existing {
            Some(entry) => self.get_state_of(service, venue_id, &entry).await,
            None => self.snapshot(service, venue_id, &BreakerEntry::default()),
        }
    }

    /// Forces the breaker open.
    pub async fn trip(&self, service: &str, venue_id: &VenueId) -> BreakerSnapshot {
        let entry = self.entry(service, venue_id).await;
        let (transition, snapshot) = {
            let mut guard = entry.lock().await;
            let transition = guard.circuit.trip(Utc::now());
            (transition, self.snapshot(service, venue_id, &guard))
        };
        if let Some(state) = transition {
            tracing::warn!(service, %venue_id, "breaker tripped manually");
            self.publish_state(service, venue_id, state, &snapshot);
        }
        snapshot
    }

    /// Forces the breaker closed and clears its counters and metrics.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::BreakerNotFound`] if no breaker exists for the
    /// pair.
    pub async fn reset(&self, service: &str, venue_id: &VenueId) -> Result<BreakerSnapshot, CoreError> {
        let entry = {
            let map = self.entries.read().await;
            map.get(&(service.to_string(), venue_id.clone())).cloned()
        }
        .ok_or_else(|| CoreError::BreakerNotFound {
            service: service.to_string(),
            venue_id: venue_id.to_string(),
        })?;

        let (transition, snapshot) = {
            let mut guard = entry.lock().await;
            let transition = guard.circuit.reset();
            guard.metrics = CallMetrics::default();
            (transition, self.snapshot(service, venue_id, &guard))
        };
        if let Some(state) = transition {
            tracing::info!(service, %venue_id, "breaker reset manually");
            self.publish_state(service, venue_id, state, &snapshot);
        }
        Ok(snapshot)
    }

    /// Drops every breaker.
    pub async fn reset_all(&self) {
        let mut map = self.entries.write().await;
        let count = map.len();
        map.clear();
        tracing::info!(count, "all breakers reset");
    }

    /// Returns snapshots of all breakers, sorted by service then venue.
    pub async fn list(&self) -> Vec<BreakerSnapshot> {
        let entries: Vec<(BreakerKey, Arc<Mutex<BreakerEntry>>)> = {
            let map = self.entries.read().await;
            map.iter()
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut snapshots = Vec::with_capacity(entries.len());
        for ((service, venue_id), entry) in entries {
            snapshots.push(self.get_state_of(&service, &venue_id, &entry).await);
        }
        snapshots.sort_by(|a, b| {
            a.service
                .cmp(&b.service)
                .then_with(|| a.venue_id.cmp(&b.venue_id))
        });
        snapshots
    }

    async fn get_state_of(
        &self,
        service: &str,
        venue_id: &VenueId,
        entry: &Mutex<BreakerEntry>,
    ) -> BreakerSnapshot {
        let (transition, snapshot) = {
            let mut guard = entry.lock().await;
            let transition = guard.circuit.poll(Utc::now(), &self.config);
            (transition, self.snapshot(service, venue_id, &guard))
        };
        if let Some(state) = transition {
            self.publish_state(service, venue_id, state, &snapshot);
        }
        snapshot
    }

    /// Atomic get-or-create of the entry for a pair.
    async fn entry(&self, service: &str, venue_id: &VenueId) -> Arc<Mutex<BreakerEntry>> {
        let key = (service.to_string(), venue_id.clone());
        if let Some(entry) = self.entries.read().await.get(&key) {
            return Arc::clone(entry);
        }
        let mut map = self.entries.write().await;
        Arc::clone(map.entry(key).or_insert_with(|| {
            tracing::debug!(service, %venue_id, "breaker created");
            Arc::new(Mutex::new(BreakerEntry::default()))
        }))
    }

    fn snapshot(&self, service: &str, venue_id: &VenueId, entry: &BreakerEntry) -> BreakerSnapshot {
        let circuit = &entry.circuit;
        BreakerSnapshot {
            service: service.to_string(),
            venue_id: venue_id.clone(),
            state: circuit.state,
            failures: circuit.failures,
            successes: circuit.successes,
            last_failure_time: circuit.last_failure_time,
            half_open_attempts: circuit.half_open_attempts,
            last_error: circuit.last_error.clone(),
            retry_after_ms: duration_ms(circuit.retry_after(Utc::now(), &self.config)),
            metrics: entry.metrics.clone(),
        }
    }

    fn publish_state(&self, service: &str, venue_id: &VenueId, state: BreakerState, snapshot: &BreakerSnapshot) {
        self.emit(service, venue_id, state, snapshot.failures, snapshot.last_error.clone());
    }

    fn publish_transition(&self, service: &str, venue_id: &VenueId, state: BreakerState, circuit: &Circuit) {
        self.emit(service, venue_id, state, circuit.failures, circuit.last_error.clone());
    }

    fn emit(
        &self,
        service: &str,
        venue_id: &VenueId,
        state: BreakerState,
        failures: u32,
        last_error: Option<String>,
    ) {
        let timestamp = Utc::now();
        let event = match state {
            BreakerState::Open => {
                tracing::warn!(service, %venue_id, failures, "breaker opened");
                CoreEvent::BreakerOpened {
                    service: service.to_string(),
                    venue_id: venue_id.clone(),
                    failures,
                    last_error,
                    timestamp,
                }
            }
            BreakerState::HalfOpen => {
                tracing::info!(service, %venue_id, "breaker half-open");
                CoreEvent::BreakerHalfOpen {
                    service: service.to_string(),
                    venue_id: venue_id.clone(),
                    timestamp,
                }
            }
            BreakerState::Closed => {
                tracing::info!(service, %venue_id, "breaker closed");
                CoreEvent::BreakerClosed {
                    service: service.to_string(),
                    venue_id: venue_id.clone(),
                    timestamp,
                }
            }
        };
        let _ = self.event_bus.publish(event);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
