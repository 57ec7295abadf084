//! Payment orchestration.
//!
//! [`PaymentHandler`] turns a [`PaymentIntent`] into at most one gateway
//! charge. Each intent maps to an [`IdempotencyKey`]; the sequence
//! "look for a prior result, call the gateway, record the result" runs
//! under a per-key lock so that concurrent duplicates collapse into a
//! single charge. Gateway calls go through the [`VenueAwareBreaker`] and
//! are never retried internally; callers retry, bounded per key by
//! `max_retries`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use tokio::sync::RwLock;

use super::attempts::AttemptRecord;
use super::gateway::{ChargeRequest, GatewayClient, IDEMPOTENCY_METADATA_KEY, VENUE_METADATA_KEY};
use super::idempotency_store::{IdempotencyStore, bounded_cache};
use super::key_lock::KeyLocks;
use super::metrics::{PaymentMetricsSnapshot, VenuePaymentMetrics};
use crate::breaker::{BreakerState, VenueAwareBreaker};
use crate::config::PaymentConfig;
use crate::domain::{
    CoreEvent, EventBus, IdempotencyKey, PaymentIntent, PaymentResult, PaymentStatus,
    PaymentWebhook, RefundResult, VenueId,
};
use crate::error::CoreError;
use crate::features::{FeatureManager, GATEWAY_LOOKUP};

/// Venue-aware payment handler.
#[derive(Debug)]
pub struct PaymentHandler {
    config: PaymentConfig,
    breaker: Arc<VenueAwareBreaker>,
    gateway: Arc<dyn GatewayClient>,
    store: Arc<dyn IdempotencyStore>,
    features: Arc<FeatureManager>,
    event_bus: EventBus,
    results: Cache<IdempotencyKey, PaymentResult>,
    attempts: Cache<IdempotencyKey, AttemptRecord>,
    metrics: RwLock<HashMap<VenueId, VenuePaymentMetrics>>,
    locks: KeyLocks,
}

impl PaymentHandler {
    /// Creates a handler around its collaborators.
    #[must_use]
    pub fn new(
        config: PaymentConfig,
        breaker: Arc<VenueAwareBreaker>,
        gateway: Arc<dyn GatewayClient>,
        store: Arc<dyn IdempotencyStore>,
        features: Arc<FeatureManager>,
        event_bus: EventBus,
    ) -> Self {
        let results = bounded_cache(config.cache_capacity, config.cache_ttl);
        let attempts = bounded_cache(config.cache_capacity, config.cache_ttl);
        Self {
            config,
            breaker,
            gateway,
            store,
            features,
            event_bus,
            results,
            attempts,
            metrics: RwLock::new(HashMap::new()),
            locks: KeyLocks::new(),
        }
    }

    /// Returns the handler configuration.
    #[must_use]
    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }

    /// Processes a payment intent, charging the customer at most once.
    ///
    /// A prior result for the same intent (local cache, durable store, or
    /// a gateway charge tagged with the key) is returned without charging.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidIntent`] if the intent is malformed.
    /// - [`CoreError::MaxRetriesExceeded`] once the key has been attempted
    ///   `1 + max_retries` times without success.
    /// - [`CoreError::CircuitOpen`] / [`CoreError::HalfOpenAttemptsExceeded`]
    ///   if the breaker for the venue rejects the call.
    /// - [`CoreError::GatewayTimeout`] if the gateway does not answer in time.
    /// - [`CoreError::Gateway`] with the gateway's own code and message.
    pub async fn process_payment(&self, intent: PaymentIntent) -> Result<PaymentResult, CoreError> {
        intent.validate()?;
        let key = IdempotencyKey::for_intent(&intent);
        let _guard = self.locks.acquire(&key).await;

        if let Some(existing) = self.find_existing(&key, &intent).await {
            return Ok(existing);
        }

        let attempt = self.begin_attempt(&key).await?;
        tracing::debug!(%key, venue_id = %intent.venue_id, attempt, "charging");

        let request = charge_request(&intent, &key);
        let gateway = Arc::clone(&self.gateway);
        let timeout = self.config.gateway_timeout;
        let outcome = self
            .breaker
            .execute(&self.config.service_name, &intent.venue_id, move || async move {
                with_timeout(timeout, gateway.create_charge(&request)).await
            })
            .await;

        match outcome {
            Ok(charge) => {
                let result = charge.into_result(intent.venue_id.clone());
                self.record(&key, &result).await;
                self.attempts.invalidate(&key).await;
                self.metrics
                    .write()
                    .await
                    .entry(intent.venue_id.clone())
                    .or_default()
                    .record_success(result.amount);
                self.event_bus.publish(CoreEvent::PaymentSucceeded {
                    venue_id: intent.venue_id.clone(),
                    payment_id: result.id.clone(),
                    amount: result.amount,
                    currency: result.currency.clone(),
                    status: result.status,
                    timestamp: Utc::now(),
                });
                tracing::info!(%key, venue_id = %intent.venue_id, payment_id = %result.id, "payment succeeded");
                Ok(result)
            }
            Err(err) => {
                self.metrics
                    .write()
                    .await
                    .entry(intent.venue_id.clone())
                    .or_default()
                    .record_failure();
                if let Some(mut record) = self.attempts.get(&key).await {
                    record.push_error(err.error_code(), err.to_string());
                    self.attempts.insert(key.clone(), record).await;
                }
                self.event_bus.publish(CoreEvent::PaymentFailed {
                    venue_id: intent.venue_id.clone(),
                    idempotency_key: key.to_string(),
                    code: err.error_code().to_string(),
                    message: err.to_string(),
                    timestamp: Utc::now(),
                });
                tracing::warn!(
                    %key,
                    venue_id = %intent.venue_id,
                    attempt,
                    code = err.error_code(),
                    error = %err,
                    "payment attempt failed"
                );
                Err(err)
            }
        }
    }

    /// Returns the recorded result for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PaymentNotFound`] if no result is cached or
    /// stored, or [`CoreError::PersistenceError`] if the store fails.
    pub async fn get_payment(&self, key: &IdempotencyKey) -> Result<PaymentResult, CoreError> {
        if let Some(result) = self.results.get(key).await {
            return Ok(result);
        }
        let result = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| CoreError::PaymentNotFound(key.to_string()))?;
        self.results.insert(key.clone(), result.clone()).await;
        Ok(result)
    }

    /// Refunds a charge through the venue's breaker.
    ///
    /// # Errors
    ///
    /// Returns the breaker rejection, [`CoreError::GatewayTimeout`], or the
    /// gateway's own error.
    pub async fn refund(
        &self,
        venue_id: &VenueId,
        charge_id: &str,
        amount: Option<i64>,
    ) -> Result<RefundResult, CoreError> {
        if charge_id.trim().is_empty() {
            return Err(CoreError::InvalidRequest("charge_id is required".to_string()));
        }
        if amount.is_some_and(|a| a <= 0) {
            return Err(CoreError::InvalidRequest("refund amount must be positive".to_string()));
        }
        let gateway = Arc::clone(&self.gateway);
        let timeout = self.config.gateway_timeout;
        let charge = charge_id.to_string();
        let refund = self
            .breaker
            .execute(&self.config.service_name, venue_id, move || async move {
                with_timeout(timeout, gateway.refund(&charge, amount)).await
            })
            .await?;
        tracing::info!(%venue_id, charge_id, refund_id = %refund.id, amount = refund.amount, "refund issued");
        Ok(refund.into())
    }

    /// Applies a gateway status notification to a recorded payment,
    /// returning the key it is recorded under and the updated result.
    ///
    /// Moving a payment into or out of `failed` moves it between the
    /// venue's successful and failed counters.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PaymentNotFound`] if no recorded payment matches
    /// the notification, or [`CoreError::InvalidRequest`] if the key and
    /// charge ID disagree.
    pub async fn apply_webhook(
        &self,
        webhook: PaymentWebhook,
    ) -> Result<(IdempotencyKey, PaymentResult), CoreError> {
        let key = self.locate(&webhook).await?;
        let _guard = self.locks.acquire(&key).await;
        let mut result = match self.get_payment(&key).await {
            Ok(result) => result,
            Err(CoreError::PaymentNotFound(_)) => {
                return Err(CoreError::PaymentNotFound(webhook.charge_id.clone()));
            }
            Err(err) => return Err(err),
        };
        if result.id != webhook.charge_id {
            return Err(CoreError::InvalidRequest(format!(
                "charge {} does not belong to key {key}",
                webhook.charge_id
            )));
        }

        let previous = result.status;
        if previous == webhook.status {
            return Ok((key, result));
        }
        result.status = webhook.status;
        self.record(&key, &result).await;

        {
            let mut metrics = self.metrics.write().await;
            let venue = metrics.entry(result.venue_id.clone()).or_default();
            match (previous == PaymentStatus::Failed, webhook.status == PaymentStatus::Failed) {
                (false, true) => venue.reclassify_as_failed(result.amount),
                (true, false) => venue.reclassify_as_succeeded(result.amount),
                _ => {}
            }
        }

        self.event_bus.publish(CoreEvent::PaymentStatusChanged {
            venue_id: result.venue_id.clone(),
            payment_id: result.id.clone(),
            status: result.status,
            timestamp: Utc::now(),
        });
        tracing::info!(
            %key,
            payment_id = %result.id,
            from = previous.as_str(),
            to = result.status.as_str(),
            "payment status updated by webhook"
        );
        Ok((key, result))
    }

    /// Returns the payment metrics for `venue_id`.
    pub async fn get_payment_metrics(&self, venue_id: &VenueId) -> PaymentMetricsSnapshot {
        self.metrics
            .read()
            .await
            .get(venue_id)
            .cloned()
            .unwrap_or_default()
            .snapshot(venue_id.clone())
    }

    /// Returns the attempt record for a key that has not yet succeeded.
    pub async fn attempt_record(&self, key: &IdempotencyKey) -> Option<AttemptRecord> {
        self.attempts.get(key).await
    }

    /// Clears metrics, cached results, attempt records, the durable store,
    /// and every breaker.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceError`] if the durable store cannot
    /// be cleared; in-process state is cleared regardless.
    pub async fn reset(&self) -> Result<(), CoreError> {
        self.metrics.write().await.clear();
        self.results.invalidate_all();
        self.attempts.invalidate_all();
        self.breaker.reset_all().await;
        tracing::info!("payment handler reset");
        self.store.clear().await
    }

    async fn find_existing(&self, key: &IdempotencyKey, intent: &PaymentIntent) -> Option<PaymentResult> {
        if let Some(result) = self.results.get(key).await {
            tracing::debug!(%key, "returning cached result");
            return Some(result);
        }

        match self.store.get(key).await {
            Ok(Some(result)) => {
                tracing::debug!(%key, "returning stored result");
                self.results.insert(key.clone(), result.clone()).await;
                return Some(result);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(%key, error = %err, "idempotency store lookup failed"),
        }

        if !self.config.lookup_existing || !self.features.is_enabled(GATEWAY_LOOKUP) {
            return None;
        }
        let breaker = self
            .breaker
            .get_state(&self.config.service_name, &intent.venue_id)
            .await;
        if breaker.state == BreakerState::Open {
            tracing::debug!(%key, venue_id = %intent.venue_id, "breaker open; skipping gateway lookup");
            return None;
        }
        let charges = match with_timeout(
            self.config.gateway_timeout,
            self.gateway
                .list_charges(&intent.customer_id, self.config.lookup_limit),
        )
        .await
        {
            Ok(charges) => charges,
            Err(err) => {
                tracing::warn!(%key, error = %err, "gateway charge lookup failed");
                return None;
            }
        };
        let charge = charges
            .into_iter()
            .find(|charge| charge.idempotency_tag() == Some(key.as_str()))?;
        let result = charge.into_result(intent.venue_id.clone());
        tracing::info!(%key, payment_id = %result.id, "found existing gateway charge");
        self.record(key, &result).await;
        self.attempts.invalidate(key).await;
        Some(result)
    }

    /// Counts a new attempt for `key`, returning its 1-based number.
    ///
    /// Callers hold the key lock, so the read-modify-write is not racy.
    async fn begin_attempt(&self, key: &IdempotencyKey) -> Result<u32, CoreError> {
        let mut record = self.attempts.get(key).await.unwrap_or_default();
        if record.is_exhausted(self.config.max_retries) {
            tracing::warn!(%key, attempts = record.count, "retry budget exhausted");
            return Err(CoreError::MaxRetriesExceeded {
                key: key.to_string(),
                attempts: record.count,
            });
        }
        record.count = record.count.saturating_add(1);
        let attempt = record.count;
        self.attempts.insert(key.clone(), record).await;
        Ok(attempt)
    }

    /// Caches `result` locally and writes it through to the store.
    async fn record(&self, key: &IdempotencyKey, result: &PaymentResult) {
        self.results.insert(key.clone(), result.clone()).await;
        if let Err(err) = self.store.put(key, result, self.config.cache_ttl).await {
            tracing::warn!(%key, error = %err, "idempotency store write failed");
        }
    }

    /// Resolves the key a notification refers to: the one it names, or
    /// the cached result holding its charge.
    async fn locate(&self, webhook: &PaymentWebhook) -> Result<IdempotencyKey, CoreError> {
        if let Some(raw) = &webhook.idempotency_key {
            return Ok(IdempotencyKey::from_raw(raw.as_str()));
        }
        self.results
            .iter()
            .find(|(_, result)| result.id == webhook.charge_id)
            .map(|(key, _)| (*key).clone())
            .ok_or_else(|| CoreError::PaymentNotFound(webhook.charge_id.clone()))
    }
}

fn charge_request(intent: &PaymentIntent, key: &IdempotencyKey) -> ChargeRequest {
    let mut metadata = intent.metadata.clone();
    metadata.insert(IDEMPOTENCY_METADATA_KEY.to_string(), key.to_string());
    metadata.insert(VENUE_METADATA_KEY.to_string(), intent.venue_id.to_string());
    ChargeRequest {
        amount: intent.amount,
        currency: intent.currency.clone(),
        customer_id: intent.customer_id.clone(),
        metadata,
        idempotency_key: key.clone(),
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, CoreError>>,
) -> Result<T, CoreError> {
    let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or_else(|_| Err(CoreError::GatewayTimeout(millis)))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use crate::error::GatewayFailure;
    use crate::payment::idempotency_store::InMemoryIdempotencyStore;
    use crate::payment::simulated::SimulatedGateway;

    struct Harness {
        handler: Arc<PaymentHandler>,
        gateway: Arc<SimulatedGateway>,
        bus: EventBus,
    }

    fn harness(payment: PaymentConfig, breaker: BreakerConfig) -> Harness {
        let bus = EventBus::new(64);
        let gateway = Arc::new(SimulatedGateway::new());
        let store = Arc::new(InMemoryIdempotencyStore::new(100, Duration::from_secs(60)));
        let handler = PaymentHandler::new(
            payment,
            Arc::new(VenueAwareBreaker::new(breaker, bus.clone())),
            Arc::clone(&gateway) as Arc<dyn GatewayClient>,
            store,
            Arc::new(FeatureManager::with_defaults()),
            bus.clone(),
        );
        Harness {
            handler: Arc::new(handler),
            gateway,
            bus,
        }
    }

    fn default_harness() -> Harness {
        harness(PaymentConfig::default(), BreakerConfig::default())
    }

    fn intent(amount: i64) -> PaymentIntent {
        PaymentIntent::new(amount, "usd", "v1", "cus_1").with_metadata("order", "o-1")
    }

    fn declined() -> GatewayFailure {
        GatewayFailure::new("card_declined", "Your card was declined.")
    }

    #[tokio::test]
    async fn blank_venue_is_rejected() {
        let h = default_harness();
        let Err(err) = h
            .handler
            .process_payment(PaymentIntent::new(100, "usd", "", "cus_1"))
            .await
        else {
            panic!("expected invalid intent");
        };
        assert_eq!(err.error_code(), "invalid_intent");
        assert_eq!(h.gateway.create_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_duplicates_charge_once() {
        let h = default_harness();
        h.gateway.set_latency(Duration::from_millis(10)).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let handler = Arc::clone(&h.handler);
            handles.push(tokio::spawn(async move { handler.process_payment(intent(2500)).await }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            let Ok(Ok(result)) = handle.await else {
                panic!("payment should succeed");
            };
            ids.push(result.id);
        }
        assert_eq!(h.gateway.create_calls(), 1);
        assert!(ids.windows(2).all(|w| matches!(w, [a, b] if a == b)));
    }

    #[tokio::test]
    async fn repeated_intent_returns_cached_result() {
        let h = default_harness();
        let Ok(first) = h.handler.process_payment(intent(1000)).await else {
            panic!("first payment should succeed");
        };
        let Ok(second) = h.handler.process_payment(intent(1000)).await else {
            panic!("second payment should succeed");
        };
        assert_eq!(first.id, second.id);
        assert_eq!(h.gateway.create_calls(), 1);
        let metrics = h.handler.get_payment_metrics(&VenueId::new("v1")).await;
        assert_eq!(metrics.total_payments, 1);
    }

    #[tokio::test]
    async fn fourth_attempt_exceeds_retry_budget() {
        let h = default_harness();
        h.gateway.fail_next(3, declined()).await;

        for _ in 0..3 {
            let Err(err) = h.handler.process_payment(intent(1000)).await else {
                panic!("attempt should fail");
            };
            assert_eq!(err.error_code(), "card_declined");
            assert_eq!(err.to_string(), "Your card was declined.");
        }
        let key = IdempotencyKey::for_intent(&intent(1000));
        let Some(record) = h.handler.attempt_record(&key).await else {
            panic!("attempt record should exist");
        };
        assert_eq!(record.count, 3);
        assert_eq!(record.errors.len(), 3);

        let Err(err) = h.handler.process_payment(intent(1000)).await else {
            panic!("fourth attempt should be refused");
        };
        assert_eq!(err.error_code(), "max_retries_exceeded");
        assert_eq!(h.gateway.create_calls(), 3);
    }

    #[tokio::test]
    async fn success_clears_attempt_record() {
        let h = default_harness();
        h.gateway.fail_next(1, declined()).await;
        assert!(h.handler.process_payment(intent(1000)).await.is_err());
        assert!(h.handler.process_payment(intent(1000)).await.is_ok());
        let key = IdempotencyKey::for_intent(&intent(1000));
        assert!(h.handler.attempt_record(&key).await.is_none());
    }

    #[tokio::test]
    async fn success_rate_reflects_outcomes() {
        let h = default_harness();
        let venue = VenueId::new("v1");
        let empty = h.handler.get_payment_metrics(&venue).await;
        assert!((empty.success_rate - 100.0).abs() < f64::EPSILON);

        assert!(h.handler.process_payment(intent(1000)).await.is_ok());
        h.gateway.fail_next(1, declined()).await;
        assert!(h.handler.process_payment(intent(2000)).await.is_err());

        let metrics = h.handler.get_payment_metrics(&venue).await;
        assert_eq!(metrics.total_payments, 2);
        assert_eq!(metrics.successful_payments, 1);
        assert_eq!(metrics.failed_payments, 1);
        assert_eq!(metrics.total_amount, 1000);
        assert!((metrics.success_rate - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn open_breaker_reports_stable_code() {
        let breaker = BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        };
        let h = harness(PaymentConfig::default(), breaker);
        h.gateway.fail_next(1, declined()).await;
        assert!(h.handler.process_payment(intent(1000)).await.is_err());

        let Err(err) = h.handler.process_payment(intent(3000)).await else {
            panic!("breaker should be open");
        };
        assert_eq!(err.error_code(), "circuit_breaker_open");
        assert_eq!(h.gateway.create_calls(), 1);
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_without_gateway_lookup() {
        let breaker = BreakerConfig {
            failure_threshold: 1,
            ..BreakerConfig::default()
        };
        let h = harness(PaymentConfig::default(), breaker);
        h.gateway.fail_next(1, declined()).await;
        assert!(h.handler.process_payment(intent(1000)).await.is_err());
        let lookups = h.gateway.list_calls();

        h.gateway.set_latency(Duration::from_millis(500)).await;
        let Ok(Err(err)) =
            tokio::time::timeout(Duration::from_millis(200), h.handler.process_payment(intent(3000))).await
        else {
            panic!("open breaker should reject without waiting on the gateway");
        };
        assert_eq!(err.error_code(), "circuit_breaker_open");
        assert_eq!(h.gateway.list_calls(), lookups);
        assert_eq!(h.gateway.create_calls(), 1);
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let payment = PaymentConfig {
            gateway_timeout: Duration::from_millis(20),
            lookup_existing: false,
            ..PaymentConfig::default()
        };
        let h = harness(payment, BreakerConfig::default());
        h.gateway.set_latency(Duration::from_millis(200)).await;
        let Err(err) = h.handler.process_payment(intent(1000)).await else {
            panic!("expected timeout");
        };
        assert_eq!(err.error_code(), "gateway_timeout");
    }

    #[tokio::test]
    async fn tagged_gateway_charge_is_reused() {
        let h = default_harness();
        let prior = intent(4200);
        let key = IdempotencyKey::for_intent(&prior);
        let Ok(charge) = h.gateway.create_charge(&charge_request(&prior, &key)).await else {
            panic!("direct charge should succeed");
        };

        let Ok(result) = h.handler.process_payment(prior).await else {
            panic!("payment should resolve to the existing charge");
        };
        assert_eq!(result.id, charge.id);
        assert_eq!(h.gateway.create_calls(), 1);
    }

    #[tokio::test]
    async fn webhook_failure_moves_metrics() {
        let h = default_harness();
        let mut rx = h.bus.subscribe();
        let Ok(result) = h.handler.process_payment(intent(1000)).await else {
            panic!("payment should succeed");
        };

        let webhook = PaymentWebhook {
            charge_id: result.id.clone(),
            idempotency_key: None,
            status: PaymentStatus::Failed,
        };
        let Ok((_, updated)) = h.handler.apply_webhook(webhook).await else {
            panic!("webhook should apply");
        };
        assert_eq!(updated.status, PaymentStatus::Failed);

        let metrics = h.handler.get_payment_metrics(&VenueId::new("v1")).await;
        assert_eq!(metrics.successful_payments, 0);
        assert_eq!(metrics.failed_payments, 1);
        assert_eq!(metrics.total_amount, 0);

        let mut saw_change = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, CoreEvent::PaymentStatusChanged { .. }) {
                saw_change = true;
            }
        }
        assert!(saw_change);
    }

    #[tokio::test]
    async fn webhook_waits_for_in_flight_payment() {
        let h = default_harness();
        let Ok(result) = h.handler.process_payment(intent(1000)).await else {
            panic!("payment should succeed");
        };
        let key = IdempotencyKey::for_intent(&intent(1000));
        let webhook = PaymentWebhook {
            charge_id: result.id.clone(),
            idempotency_key: Some(key.as_str().to_string()),
            status: PaymentStatus::Failed,
        };

        let guard = h.handler.locks.acquire(&key).await;
        let pending = tokio::time::timeout(
            Duration::from_millis(50),
            h.handler.apply_webhook(webhook.clone()),
        )
        .await;
        assert!(pending.is_err(), "webhook applied while the key was locked");
        drop(guard);

        let Ok((_, updated)) = h.handler.apply_webhook(webhook).await else {
            panic!("webhook should apply once the key is free");
        };
        assert_eq!(updated.status, PaymentStatus::Failed);
        let metrics = h.handler.get_payment_metrics(&VenueId::new("v1")).await;
        assert_eq!(metrics.successful_payments, 0);
        assert_eq!(metrics.failed_payments, 1);
    }

    #[tokio::test]
    async fn webhook_for_unknown_charge_is_not_found() {
        let h = default_harness();
        let webhook = PaymentWebhook {
            charge_id: "ch_missing".to_string(),
            idempotency_key: None,
            status: PaymentStatus::Failed,
        };
        let Err(err) = h.handler.apply_webhook(webhook).await else {
            panic!("expected not found");
        };
        assert_eq!(err.error_code(), "payment_not_found");
    }

    #[tokio::test]
    async fn refund_goes_through_gateway() {
        let h = default_harness();
        let Ok(result) = h.handler.process_payment(intent(1000)).await else {
            panic!("payment should succeed");
        };
        let Ok(refund) = h.handler.refund(&VenueId::new("v1"), &result.id, Some(400)).await else {
            panic!("refund should succeed");
        };
        assert_eq!(refund.amount, 400);
        assert_eq!(refund.charge_id, result.id);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let h = default_harness();
        h.gateway.fail_next(1, declined()).await;
        assert!(h.handler.process_payment(intent(1000)).await.is_err());
        assert!(h.handler.reset().await.is_ok());

        let key = IdempotencyKey::for_intent(&intent(1000));
        assert!(h.handler.attempt_record(&key).await.is_none());
        let metrics = h.handler.get_payment_metrics(&VenueId::new("v1")).await;
        assert_eq!(metrics.total_payments, 0);
    }
}
