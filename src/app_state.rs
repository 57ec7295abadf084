//! Shared application state injected into all Axum handlers.
//!
//! Built once at startup from [`CoreConfig`]; tests build isolated
//! instances the same way.

use std::sync::Arc;

use crate::breaker::VenueAwareBreaker;
use crate::config::CoreConfig;
use crate::domain::EventBus;
use crate::features::FeatureManager;
use crate::load::{ConnectionTracker, LoadMonitor, TransportMonitor};
use crate::optimization::OptimizationManager;
use crate::payment::{GatewayClient, IdempotencyStore, InMemoryIdempotencyStore, PaymentHandler};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Payment orchestration.
    pub payments: Arc<PaymentHandler>,
    /// Per `(service, venue)` circuit breakers.
    pub breaker: Arc<VenueAwareBreaker>,
    /// Feature flags.
    pub features: Arc<FeatureManager>,
    /// Venue load sampling.
    pub load_monitor: Arc<LoadMonitor>,
    /// Venue channel optimizations.
    pub optimization: Arc<OptimizationManager>,
    /// Real-time connection counters.
    pub tracker: Arc<ConnectionTracker>,
    /// Event bus for WebSocket subscriptions and background listeners.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires every component from `config` around the given gateway and
    /// idempotency store.
    #[must_use]
    pub fn new(
        config: &CoreConfig,
        gateway: Arc<dyn GatewayClient>,
        store: Arc<dyn IdempotencyStore>,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);

        let features = Arc::new(FeatureManager::with_defaults());
        features.apply_overrides(&config.features_enabled, &config.features_disabled);

        let breaker = Arc::new(VenueAwareBreaker::new(config.breaker.clone(), event_bus.clone()));
        let payments = Arc::new(PaymentHandler::new(
            config.payment.clone(),
            Arc::clone(&breaker),
            gateway,
            store,
            Arc::clone(&features),
            event_bus.clone(),
        ));

        let tracker = Arc::new(ConnectionTracker::default());
        let load_monitor = Arc::new(LoadMonitor::new(
            Arc::clone(&tracker) as Arc<dyn TransportMonitor>
        ));
        let optimization = Arc::new(OptimizationManager::new(
            config.optimization.clone(),
            Arc::clone(&features),
            event_bus.clone(),
        ));

        Self {
            payments,
            breaker,
            features,
            load_monitor,
            optimization,
            tracker,
            event_bus,
        }
    }

    /// Wires every component with a process-local idempotency store.
    #[must_use]
    pub fn in_memory(config: &CoreConfig, gateway: Arc<dyn GatewayClient>) -> Self {
        let store = Arc::new(InMemoryIdempotencyStore::new(
            config.payment.cache_capacity,
            config.payment.cache_ttl,
        ));
        Self::new(config, gateway, store)
    }
}
