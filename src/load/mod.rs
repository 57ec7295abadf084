//! Venue load sampling for the real-time channel.

pub mod monitor;
pub mod tracker;

pub use monitor::{LoadMonitor, TransportMonitor, TransportSample};
pub use tracker::ConnectionTracker;
