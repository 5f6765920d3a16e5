use std::sync::Arc;

use async_trait::async_trait;
use jirabridge_schema::{Instance, InstanceId, Instances};

use crate::keys::{instance_key, INSTANCES_KEY};
use crate::{load_json, store_json, KeyedLocks, KvStore, StoreError};

#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// An absent registry is empty, never an error.
    async fn load_instances(&self) -> Result<Instances, StoreError>;

    async fn load_instance(&self, id: &InstanceId) -> Result<Instance, StoreError>;

    /// Writes the record, then registers it in the index.
    async fn store_instance(&self, instance: &Instance) -> Result<(), StoreError>;

    /// Unregisters from the index, then deletes the record. Deleting an
    /// unknown id is a no-op.
    async fn delete_instance(&self, id: &InstanceId) -> Result<(), StoreError>;
}

pub struct KvInstanceStore {
    kv: Arc<dyn KvStore>,
    locks: KeyedLocks,
}

impl KvInstanceStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            locks: KeyedLocks::new(),
        }
    }
}

#[async_trait]
impl InstanceStore for KvInstanceStore {
    async fn load_instances(&self) -> Result<Instances, StoreError> {
        Ok(load_json(self.kv.as_ref(), INSTANCES_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn load_instance(&self, id: &InstanceId) -> Result<Instance, StoreError> {
        load_json(self.kv.as_ref(), &instance_key(id))
            .await?
            .ok_or_else(|| StoreError::InstanceNotFound(id.clone()))
    }

    async fn store_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        store_json(self.kv.as_ref(), &instance_key(instance.id()), instance).await?;

        let _guard = self.locks.acquire(INSTANCES_KEY).await;
        let mut instances = self.load_instances().await?;
        instances.set(instance.meta());
        store_json(self.kv.as_ref(), INSTANCES_KEY, &instances).await?;

        tracing::debug!(instance = %instance.id(), count = instances.len(), "stored instance");
        Ok(())
    }

    async fn delete_instance(&self, id: &InstanceId) -> Result<(), StoreError> {
        {
            let _guard = self.locks.acquire(INSTANCES_KEY).await;
            let mut instances = self.load_instances().await?;
            if instances.delete(id).is_some() {
                store_json(self.kv.as_ref(), INSTANCES_KEY, &instances).await?;
            }
        }
        self.kv.delete(&instance_key(id)).await?;

        tracing::debug!(instance = %id, "deleted instance");
        Ok(())
    }
}
