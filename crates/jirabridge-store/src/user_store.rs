use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexSet;
use jirabridge_schema::{Connection, InstanceId, User, UserId};

use crate::keys::{account_key, connection_key, instance_users_key, user_key};
use crate::{load_json, store_json, KeyedLocks, KvStore, StoreError};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn load_user(&self, user_id: &UserId) -> Result<User, StoreError>;

    async fn store_user(&self, user: &User) -> Result<(), StoreError>;

    async fn load_connection(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<Connection, StoreError>;

    /// Writes the connection, then its account and instance-membership indexes.
    async fn store_connection(&self, connection: &Connection) -> Result<(), StoreError>;

    /// Removes the connection and its index entries. Absent connections are
    /// not an error.
    async fn delete_connection(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<(), StoreError>;

    /// Platform user linked to a Jira account on an instance.
    async fn load_platform_user_id(
        &self,
        instance_id: &InstanceId,
        account_id: &str,
    ) -> Result<UserId, StoreError>;

    /// Every platform user holding a connection to the instance.
    async fn load_instance_users(&self, instance_id: &InstanceId)
        -> Result<Vec<UserId>, StoreError>;
}

pub struct KvUserStore {
    kv: Arc<dyn KvStore>,
    locks: KeyedLocks,
}

impl KvUserStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            locks: KeyedLocks::new(),
        }
    }

    async fn update_instance_users<F>(
        &self,
        instance_id: &InstanceId,
        mutate: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&mut IndexSet<UserId>) -> bool + Send,
    {
        let key = instance_users_key(instance_id);
        let _guard = self.locks.acquire(&key).await;
        let mut users: IndexSet<UserId> = load_json(self.kv.as_ref(), &key)
            .await?
            .unwrap_or_default();
        if !mutate(&mut users) {
            return Ok(());
        }
        if users.is_empty() {
            self.kv.delete(&key).await
        } else {
            store_json(self.kv.as_ref(), &key, &users).await
        }
    }

    async fn write_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let instance_id = &connection.instance_id;
        let user_id = &connection.platform_user_id;
        let conn_key = connection_key(instance_id, user_id);
        let _guard = self.locks.acquire(&conn_key).await;

        let previous = self.load_connection_opt(instance_id, user_id).await?;
        store_json(self.kv.as_ref(), &conn_key, connection).await?;

        if let Some(previous) = previous {
            if previous.account.account_id != connection.account.account_id {
                self.kv
                    .delete(&account_key(instance_id, &previous.account.account_id))
                    .await?;
            }
        }
        store_json(
            self.kv.as_ref(),
            &account_key(instance_id, &connection.account.account_id),
            user_id,
        )
        .await?;

        let user_id = user_id.clone();
        self.update_instance_users(instance_id, move |users| users.insert(user_id))
            .await
    }

    async fn remove_connection(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        let conn_key = connection_key(instance_id, user_id);
        let _guard = self.locks.acquire(&conn_key).await;

        if let Some(previous) = self.load_connection_opt(instance_id, user_id).await? {
            self.kv.delete(&conn_key).await?;
            let acct_key = account_key(instance_id, &previous.account.account_id);
            let owner: Option<UserId> = load_json(self.kv.as_ref(), &acct_key).await?;
            if owner.as_ref() == Some(user_id) {
                self.kv.delete(&acct_key).await?;
            }
        }

        let user_id = user_id.clone();
        self.update_instance_users(instance_id, move |users| users.shift_remove(&user_id))
            .await
    }

    async fn load_connection_opt(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<Option<Connection>, StoreError> {
        load_json(self.kv.as_ref(), &connection_key(instance_id, user_id)).await
    }
}

#[async_trait]
impl UserStore for KvUserStore {
    async fn load_user(&self, user_id: &UserId) -> Result<User, StoreError> {
        load_json(self.kv.as_ref(), &user_key(user_id))
            .await?
            .ok_or_else(|| StoreError::UserNotFound(user_id.clone()))
    }

    async fn store_user(&self, user: &User) -> Result<(), StoreError> {
        store_json(self.kv.as_ref(), &user_key(&user.platform_user_id), user).await
    }

    async fn load_connection(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<Connection, StoreError> {
        self.load_connection_opt(instance_id, user_id)
            .await?
            .ok_or_else(|| StoreError::ConnectionNotFound {
                instance_id: instance_id.clone(),
                user_id: user_id.clone(),
            })
    }

    async fn store_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let result = self.write_connection(connection).await;
        self.locks.cleanup_unused().await;
        result
    }

    async fn delete_connection(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        let result = self.remove_connection(instance_id, user_id).await;
        self.locks.cleanup_unused().await;
        result
    }

    async fn load_platform_user_id(
        &self,
        instance_id: &InstanceId,
        account_id: &str,
    ) -> Result<UserId, StoreError> {
        load_json(self.kv.as_ref(), &account_key(instance_id, account_id))
            .await?
            .ok_or_else(|| StoreError::AccountNotFound {
                instance_id: instance_id.clone(),
                account_id: account_id.to_string(),
            })
    }

    async fn load_instance_users(
        &self,
        instance_id: &InstanceId,
    ) -> Result<Vec<UserId>, StoreError> {
        let users: Option<IndexSet<UserId>> =
            load_json(self.kv.as_ref(), &instance_users_key(instance_id)).await?;
        Ok(users.map(|set| set.into_iter().collect()).unwrap_or_default())
    }
}
