//! Per-idempotency-key async locks.
//!
//! Serializes the "check caches, call gateway, store result" sequence for
//! one key while letting different keys proceed in parallel. A key's lock
//! is dropped from the table once its last holder or waiter is gone.

use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::IdempotencyKey;

type LockTable = HashMap<IdempotencyKey, Arc<Mutex<()>>>;

/// Table of per-key mutexes.
#[derive(Debug, Default)]
pub struct KeyLocks {
    table: std::sync::Mutex<LockTable>,
}

impl KeyLocks {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: &IdempotencyKey) -> KeyGuard<'_> {
        let lock = Arc::clone(self.table().entry(key.clone()).or_default());
        let guard = Arc::clone(&lock).lock_owned().await;
        KeyGuard {
            locks: self,
            key: key.clone(),
            lock,
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or awaited.
    #[cfg(test)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Returns `true` if no key is locked.
    #[cfg(test)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one key; released on drop.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    locks: &'a KeyLocks,
    key: IdempotencyKey,
    lock: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut table = self.locks.table();
        // The table and this guard hold the only references.
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_serialized() {
        let locks = Arc::new(KeyLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));
        let key = IdempotencyKey::from_raw("V1_abc");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&key).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            assert!(handle.await.is_ok());
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyLocks::new();
        let a = IdempotencyKey::from_raw("V1_a");
        let b = IdempotencyKey::from_raw("V1_b");
        let _first = locks.acquire(&a).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&b)).await;
        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);
    }
}
