//! Payment processing: gateway seam, idempotency, retries, and metrics.

pub mod attempts;
pub mod gateway;
pub mod handler;
pub mod http_gateway;
pub mod idempotency_store;
pub mod key_lock;
pub mod metrics;
pub mod simulated;

pub use attempts::{AttemptError, AttemptRecord};
pub use gateway::{Charge, ChargeRequest, GatewayClient, Refund};
pub use handler::PaymentHandler;
pub use http_gateway::HttpGatewayClient;
pub use idempotency_store::{IdempotencyStore, InMemoryIdempotencyStore};
pub use metrics::{PaymentMetricsSnapshot, VenuePaymentMetrics};
pub use simulated::SimulatedGateway;
