//! Load-adaptive optimizations for venue real-time channels.

pub mod batch;
pub mod manager;
pub mod profile;
pub mod tasks;

pub use manager::OptimizationManager;
pub use tasks::{run_event_listener, run_load_sampler};
pub use profile::{OptimizationDecision, OptimizationProfile, load_level, should_optimize};
