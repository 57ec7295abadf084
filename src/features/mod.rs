//! Feature flags consulted by the payment handler and optimization manager.

pub mod flag;
pub mod manager;

pub use flag::{FeatureConfig, FeatureFlag, rollout_bucket};
pub use manager::{COMPRESSION, FeatureManager, GATEWAY_LOOKUP, MESSAGE_BATCHING};
