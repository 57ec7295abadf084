//! # venue-payments
//!
//! Venue-aware payment orchestration: per-venue circuit breaking,
//! idempotent retries against a payment gateway, and load-adaptive
//! real-time channels for venue clients.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)  ──► ConnectionTracker (load/)
//!     │
//!     ├── PaymentHandler (payment/)
//!     │     ├── VenueAwareBreaker (breaker/)
//!     │     ├── GatewayClient (simulated / HTTP)
//!     │     └── IdempotencyStore (memory / PostgreSQL)
//!     │
//!     ├── EventBus (domain/)
//!     │     └── OptimizationManager (optimization/) ◄── LoadMonitor (load/)
//!     │
//!     └── FeatureManager (features/)
//! ```

pub mod api;
pub mod app_state;
pub mod breaker;
pub mod config;
pub mod domain;
pub mod error;
pub mod features;
pub mod load;
pub mod optimization;
pub mod payment;
pub mod persistence;
pub mod ws;
