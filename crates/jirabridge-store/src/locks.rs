//! Per-key mutual exclusion for read-modify-write cycles against the store.
//!
//! The store only guarantees atomicity of a single `set`. Updates that read a
//! record, change it and write it back (registry index, user membership set,
//! connection settings) hold the lock for that key for the whole cycle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct KeyedLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire exclusive access to `key`; released when the guard drops.
    pub async fn acquire(&self, key: &str) -> KeyedLockGuard {
        let lock = self.lock_for(key).await;
        KeyedLockGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Returns `None` if the key is already held.
    pub async fn try_acquire(&self, key: &str) -> Option<KeyedLockGuard> {
        let lock = self.lock_for(key).await;
        lock.try_lock_owned()
            .ok()
            .map(|guard| KeyedLockGuard { _guard: guard })
    }

    /// Drop entries nobody holds or waits for.
    pub async fn cleanup_unused(&self) {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

pub struct KeyedLockGuard {
    _guard: OwnedMutexGuard<()>,
}
