//! Domain layer: core types and the event system.
//!
//! This module contains the venue-keyed domain model shared by every
//! component: venue identity, payment intents and results, idempotency
//! keys, load samples, and the event bus that carries breaker and payment
//! events between components.

pub mod core_event;
pub mod event_bus;
pub mod idempotency_key;
pub mod payment;
pub mod venue_id;
pub mod venue_metrics;

pub use core_event::{BatchEncoding, CoreEvent};
pub use event_bus::EventBus;
pub use idempotency_key::IdempotencyKey;
pub use payment::{PaymentIntent, PaymentResult, PaymentStatus, PaymentWebhook, RefundResult};
pub use venue_id::VenueId;
pub use venue_metrics::{LoadLevel, VenueMetrics};
