//! Persistence layer: durable idempotency records in PostgreSQL.
//!
//! [`postgres::PostgresIdempotencyStore`] implements
//! [`crate::payment::IdempotencyStore`] on top of `sqlx::PgPool`, so
//! finalized payment results survive restarts and are shared between
//! instances.

pub mod models;
pub mod postgres;
