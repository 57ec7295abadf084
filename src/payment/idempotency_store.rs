//! Durable idempotency store seam.
//!
//! The payment handler writes every finalized [`PaymentResult`] through to
//! an [`IdempotencyStore`] so that results survive beyond the in-process
//! cache. The in-memory implementation backs tests and single-node runs;
//! `persistence::postgres` provides the durable one.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::domain::{IdempotencyKey, PaymentResult};
use crate::error::CoreError;

/// Key → result store with per-entry TTL.
#[async_trait]
pub trait IdempotencyStore: Send + Sync + Debug {
    /// Returns the live result for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceError`] if the backend fails.
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<PaymentResult>, CoreError>;

    /// Stores `result` under `key` for `ttl`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceError`] if the backend fails.
    async fn put(
        &self,
        key: &IdempotencyKey,
        result: &PaymentResult,
        ttl: Duration,
    ) -> Result<(), CoreError>;

    /// Deletes every stored result.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::PersistenceError`] if the backend fails.
    async fn clear(&self) -> Result<(), CoreError>;
}

/// Builds a key-indexed cache holding at most `capacity` entries, each for `ttl`.
pub(crate) fn bounded_cache<V>(capacity: usize, ttl: Duration) -> Cache<IdempotencyKey, V>
where
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(u64::try_from(capacity).unwrap_or(u64::MAX))
        .time_to_live(ttl)
        .build()
}

/// Process-local store bounded by capacity and TTL.
#[derive(Debug)]
pub struct InMemoryIdempotencyStore {
    entries: Cache<IdempotencyKey, PaymentResult>,
}

impl InMemoryIdempotencyStore {
    /// Creates a store holding at most `capacity` results for `ttl` each.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: bounded_cache(capacity, ttl),
        }
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<PaymentResult>, CoreError> {
        Ok(self.entries.get(key).await)
    }

    async fn put(
        &self,
        key: &IdempotencyKey,
        result: &PaymentResult,
        _ttl: Duration,
    ) -> Result<(), CoreError> {
        self.entries.insert(key.clone(), result.clone()).await;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.entries.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{PaymentStatus, VenueId};
    use chrono::Utc;

    fn result() -> PaymentResult {
        PaymentResult {
            id: "ch_1".to_string(),
            status: PaymentStatus::Succeeded,
            amount: 100,
            currency: "usd".to_string(),
            venue_id: VenueId::new("v1"),
            customer_id: "cus_1".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_get_clear() {
        let store = InMemoryIdempotencyStore::new(10, Duration::from_secs(60));
        let key = IdempotencyKey::from_raw("V1_abc");

        let Ok(None) = store.get(&key).await else {
            panic!("store should start empty");
        };
        assert!(store.put(&key, &result(), Duration::from_secs(60)).await.is_ok());
        let Ok(Some(found)) = store.get(&key).await else {
            panic!("stored result missing");
        };
        assert_eq!(found.id, "ch_1");

        assert!(store.clear().await.is_ok());
        let Ok(None) = store.get(&key).await else {
            panic!("store should be empty after clear");
        };
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let store = InMemoryIdempotencyStore::new(10, Duration::from_millis(20));
        let key = IdempotencyKey::from_raw("V1_ttl");
        assert!(store.put(&key, &result(), Duration::from_millis(20)).await.is_ok());
        let Ok(Some(_)) = store.get(&key).await else {
            panic!("fresh result missing");
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        let Ok(None) = store.get(&key).await else {
            panic!("expired result still served");
        };
    }

    #[tokio::test]
    async fn capacity_bounds_the_cache() {
        let cache = bounded_cache::<u32>(2, Duration::from_secs(60));
        for n in 0..50 {
            cache.insert(IdempotencyKey::from_raw(format!("V1_{n}")), n).await;
        }
        cache.run_pending_tasks().await;
        assert!(cache.entry_count() <= 2);
    }
}
