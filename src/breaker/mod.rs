//! Venue-aware circuit breaking.
//!
//! [`state`] holds the pure state machine; [`venue_breaker`] partitions it
//! by `(service, venue)` and wraps calls.

pub mod state;
pub mod venue_breaker;

pub use state::{BreakerEvent, BreakerState, Circuit};
pub use venue_breaker::{BreakerSnapshot, CallMetrics, VenueAwareBreaker};
