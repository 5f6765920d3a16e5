use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::StoreError;

/// The host's persistent key-value primitive. Each call is atomic for its key;
/// nothing spans keys.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Like `set`, but the value disappears once `ttl` has elapsed.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Stores `value` only if `key` holds no live value. Returns whether the
    /// write happened. Must be atomic across every writer sharing the store.
    async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError>;
}

pub async fn load_json<T>(kv: &dyn KvStore, key: &str) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    let Some(bytes) = kv.get(key).await? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
        key: key.to_string(),
        source,
    })?;
    Ok(Some(value))
}

pub async fn store_json<T>(kv: &dyn KvStore, key: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + Sync,
{
    let bytes = encode(key, value)?;
    kv.set(key, &bytes).await
}

/// Encodes and writes `value` unless the key is already taken.
pub async fn store_json_if_absent<T>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
) -> Result<bool, StoreError>
where
    T: Serialize + Sync,
{
    let bytes = encode(key, value)?;
    kv.set_if_absent(key, &bytes).await
}

pub async fn store_json_with_expiry<T>(
    kv: &dyn KvStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), StoreError>
where
    T: Serialize + Sync,
{
    let bytes = encode(key, value)?;
    kv.set_with_expiry(key, &bytes, ttl).await
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process store used by tests and single-node deployments without a
/// database.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.entries.write().await.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.entries.write().await.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(true)
    }
}
