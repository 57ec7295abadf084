//! Background loops feeding the optimization manager.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::manager::OptimizationManager;
use crate::domain::CoreEvent;
use crate::load::{ConnectionTracker, LoadMonitor};

/// Reacts to core events until the bus closes.
///
/// Breaker openings tighten the venue, closings relax it, and payment
/// notifications for batching venues are queued for the next flush.
pub async fn run_event_listener(
    manager: Arc<OptimizationManager>,
    mut events: broadcast::Receiver<CoreEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => handle_event(&manager, event).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "optimization listener lagged behind event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("optimization listener stopped");
}

/// Applies one event to the manager.
pub async fn handle_event(manager: &OptimizationManager, event: CoreEvent) {
    match &event {
        CoreEvent::BreakerOpened {
            venue_id, service, ..
        } => {
            manager.handle_breaker_open(venue_id, service).await;
        }
        CoreEvent::BreakerClosed {
            venue_id, service, ..
        } => {
            manager.handle_service_recovery(venue_id, service).await;
        }
        _ if event.is_batchable() => {
            let venue_id = event.venue_id().clone();
            match serde_json::to_value(&event) {
                Ok(message) => {
                    manager.enqueue(&venue_id, message).await;
                }
                Err(err) => tracing::warn!(%venue_id, error = %err, "event not serializable"),
            }
        }
        _ => {}
    }
}

/// Samples every venue with tracked connections every `period`,
/// optimizing busy venues and cleaning up venues with none left.
pub async fn run_load_sampler(
    manager: Arc<OptimizationManager>,
    monitor: Arc<LoadMonitor>,
    tracker: Arc<ConnectionTracker>,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.tick().await;
    loop {
        ticker.tick().await;
        sample_once(&manager, &monitor, &tracker).await;
    }
}

/// One sampling pass over the tracked venues.
pub async fn sample_once(
    manager: &OptimizationManager,
    monitor: &LoadMonitor,
    tracker: &ConnectionTracker,
) {
    for venue_id in tracker.known_venues() {
        let metrics = match monitor.track_venue(&venue_id).await {
            Ok(metrics) => metrics,
            Err(err) => {
                tracing::warn!(%venue_id, error = %err, "load sample failed");
                continue;
            }
        };
        if metrics.connections == 0 {
            manager.cleanup(&venue_id).await;
            monitor.forget(&venue_id).await;
            tracker.forget_idle(&venue_id);
        } else {
            manager.optimize(&metrics).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::config::OptimizationConfig;
    use crate::domain::{EventBus, PaymentStatus, VenueId};
    use crate::features::FeatureManager;
    use crate::load::TransportMonitor;

    fn manager() -> Arc<OptimizationManager> {
        let config = OptimizationConfig {
            warning_connections: 2,
            critical_connections: 4,
            ..OptimizationConfig::default()
        };
        Arc::new(OptimizationManager::new(
            config,
            Arc::new(FeatureManager::with_defaults()),
            EventBus::new(16),
        ))
    }

    #[tokio::test]
    async fn breaker_events_toggle_emergency() {
        let manager = manager();
        let v1 = VenueId::new("v1");
        handle_event(
            &manager,
            CoreEvent::BreakerOpened {
                service: "payment_gateway".to_string(),
                venue_id: v1.clone(),
                failures: 5,
                last_error: None,
                timestamp: Utc::now(),
            },
        )
        .await;
        assert!(manager.get_profile(&v1).await.is_some_and(|p| p.emergency));

        handle_event(
            &manager,
            CoreEvent::BreakerClosed {
                service: "payment_gateway".to_string(),
                venue_id: v1.clone(),
                timestamp: Utc::now(),
            },
        )
        .await;
        assert!(manager.get_profile(&v1).await.is_none());
    }

    #[tokio::test]
    async fn payment_events_are_queued_for_batching_venues() {
        let manager = manager();
        let v1 = VenueId::new("v1");
        manager.enable_message_batching(&v1).await;
        handle_event(
            &manager,
            CoreEvent::PaymentStatusChanged {
                venue_id: v1.clone(),
                payment_id: "ch_1".to_string(),
                status: PaymentStatus::Failed,
                timestamp: Utc::now(),
            },
        )
        .await;
        assert!(matches!(manager.flush(&v1).await, Ok(1)));
    }

    #[tokio::test]
    async fn sampler_optimizes_busy_and_cleans_idle_venues() {
        let manager = manager();
        let tracker = Arc::new(ConnectionTracker::default());
        let monitor = LoadMonitor::new(Arc::clone(&tracker) as Arc<dyn TransportMonitor>);
        let busy = VenueId::new("busy");
        let idle = VenueId::new("idle");
        for _ in 0..3 {
            tracker.connection_opened(&busy);
        }
        tracker.connection_opened(&idle);
        sample_once(&manager, &monitor, &tracker).await;
        assert!(manager.get_profile(&busy).await.is_some_and(|p| p.batching_enabled));

        manager.enable_message_batching(&idle).await;
        tracker.connection_closed(&idle);
        sample_once(&manager, &monitor, &tracker).await;
        assert!(manager.get_profile(&idle).await.is_none());
        assert_eq!(tracker.known_venues(), vec![busy]);
    }
}
