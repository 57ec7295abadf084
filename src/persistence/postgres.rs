//! PostgreSQL implementation of the idempotency store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use super::models::IdempotencyRecord;
use crate::domain::{IdempotencyKey, PaymentResult};
use crate::error::CoreError;
use crate::payment::IdempotencyStore;

/// PostgreSQL-backed idempotency store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError::PersistenceError`] if the database is
    /// unreachable or a migration fails.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| CoreError::PersistenceError(e.to_string()))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| CoreError::PersistenceError(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Deletes expired records, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError::PersistenceError`] on database failure.
    pub async fn purge_expired(&self) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM payment_idempotency WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::PersistenceError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<PaymentResult>, CoreError> {
        let row = sqlx::query_as::<_, (String, serde_json::Value, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT key, result, expires_at, created_at FROM payment_idempotency WHERE key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::PersistenceError(e.to_string()))?;

        let Some((key, result, expires_at, created_at)) = row else {
            return Ok(None);
        };
        let record = IdempotencyRecord {
            key,
            result,
            expires_at,
            created_at,
        };
        if record.is_expired(Utc::now()) {
            return Ok(None);
        }
        record.into_result().map(Some)
    }

    async fn put(
        &self,
        key: &IdempotencyKey,
        result: &PaymentResult,
        ttl: Duration,
    ) -> Result<(), CoreError> {
        let payload =
            serde_json::to_value(result).map_err(|e| CoreError::PersistenceError(e.to_string()))?;
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let expires_at = Utc::now().checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        sqlx::query(
            "INSERT INTO payment_idempotency (key, result, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (key) DO UPDATE SET result = EXCLUDED.result, expires_at = EXCLUDED.expires_at",
        )
        .bind(key.as_str())
        .bind(&payload)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::PersistenceError(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM payment_idempotency")
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::PersistenceError(e.to_string()))?;
        Ok(())
    }
}
