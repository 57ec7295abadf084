//! Data Transfer Objects for REST request/response serialization.

pub mod breaker_dto;
pub mod common_dto;
pub mod payment_dto;
pub mod venue_dto;

pub use breaker_dto::*;
pub use common_dto::*;
pub use payment_dto::*;
pub use venue_dto::*;
