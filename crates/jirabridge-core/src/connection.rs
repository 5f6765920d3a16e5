//! Linking chat users to Jira accounts.
//!
//! Write ordering: the Connection (with its indexes) is written before the
//! User membership set on link, and deleted before it on unlink. A crash in
//! between leaves an orphan Connection, which lookups still treat as valid.

use std::sync::Arc;

use chrono::Utc;
use jirabridge_auth::{
    exchange_code_for_tokens, take_pending_authorization, verify_link_token, AuthError,
    OAuth2Endpoints, SecretsStore,
};
use jirabridge_schema::{
    Connection, ConnectionSettings, Credential, Instance, InstanceId, User, UserId,
};
use jirabridge_store::keys::{connection_key, user_key};
use jirabridge_store::{InstanceStore, KeyedLocks, KvStore, StoreError, UserStore};
use url::Url;

use crate::instance::{oauth_callback_url, AuthHandshake, HandshakeContext, InstanceCapabilities};
use crate::jira_client::JiraError;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Jira(#[from] JiraError),
    #[error("Your account is already connected to {0}.")]
    AlreadyConnected(InstanceId),
    #[error("OAuth 2.0 is not configured for {0}. Ask a System Administrator to run `/jira instance oauth`.")]
    OAuthNotConfigured(InstanceId),
    #[error("{0} is a Jira {1} instance and cannot complete this kind of connection")]
    WrongVariant(InstanceId, jirabridge_schema::InstanceType),
    #[error("This link was issued for {issued_for}, not {submitted_to}. Run the connect command again.")]
    InstanceMismatch {
        issued_for: InstanceId,
        submitted_to: InstanceId,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Unknown setting.")]
    UnknownSetting,
    #[error("`/jira settings notifications [value]`\n* Invalid value. Accepted values are: `on` or `off`.")]
    InvalidValue,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the user hands back to finish a link.
#[derive(Debug, Clone)]
pub enum Redemption {
    /// Cloud connect page: the signed link token plus the user's API token.
    /// `instance_id` is the instance whose page received the submission.
    ApiToken {
        instance_id: InstanceId,
        link_token: String,
        email: String,
        api_token: String,
    },
    /// Server OAuth callback.
    OAuth2 { state: String, code: String },
}

pub struct ConnectionManager {
    instances: Arc<dyn InstanceStore>,
    users: Arc<dyn UserStore>,
    secrets: Arc<dyn SecretsStore>,
    kv: Arc<dyn KvStore>,
    http: reqwest::Client,
    public_url: Url,
    locks: KeyedLocks,
}

impl ConnectionManager {
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        users: Arc<dyn UserStore>,
        secrets: Arc<dyn SecretsStore>,
        kv: Arc<dyn KvStore>,
        http: reqwest::Client,
        public_url: Url,
    ) -> Self {
        Self {
            instances,
            users,
            secrets,
            kv,
            http,
            public_url,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn begin_link(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<AuthHandshake, LinkError> {
        let instance = self.instances.load_instance(instance_id).await?;
        match self.users.load_connection(instance_id, user_id).await {
            Ok(_) => return Err(LinkError::AlreadyConnected(instance_id.clone())),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }

        let ctx = HandshakeContext {
            public_url: &self.public_url,
            secrets: self.secrets.as_ref(),
            kv: self.kv.as_ref(),
            now: Utc::now(),
        };
        let handshake = instance.build_auth_handshake(user_id, &ctx).await?;
        tracing::debug!(instance = %instance_id, user = %user_id, kind = %handshake.kind, "began link");
        Ok(handshake)
    }

    pub async fn complete_link(&self, redemption: Redemption) -> Result<Connection, LinkError> {
        let (instance, user_id, credential) = match redemption {
            Redemption::ApiToken {
                instance_id,
                link_token,
                email,
                api_token,
            } => {
                let key = self.secrets.verifying_key().await?;
                let claims = verify_link_token(&key, &link_token, Utc::now())?;
                if claims.instance_id != instance_id {
                    return Err(LinkError::InstanceMismatch {
                        issued_for: claims.instance_id,
                        submitted_to: instance_id,
                    });
                }
                let instance = self.instances.load_instance(&claims.instance_id).await?;
                if !matches!(instance, Instance::Cloud(_)) {
                    return Err(LinkError::WrongVariant(
                        instance.id().clone(),
                        instance.instance_type(),
                    ));
                }
                let credential = Credential::ApiToken {
                    email,
                    token: api_token,
                };
                (instance, claims.user_id, credential)
            }
            Redemption::OAuth2 { state, code } => {
                let pending = take_pending_authorization(self.kv.as_ref(), &state).await?;
                let instance = self.instances.load_instance(&pending.instance_id).await?;
                let Instance::Server(server) = &instance else {
                    return Err(LinkError::WrongVariant(
                        instance.id().clone(),
                        instance.instance_type(),
                    ));
                };
                let client = server
                    .oauth_client
                    .as_ref()
                    .ok_or_else(|| LinkError::OAuthNotConfigured(server.id.clone()))?;
                let endpoints = OAuth2Endpoints::for_jira_server(
                    server.id.as_str(),
                    client,
                    &oauth_callback_url(&self.public_url),
                );
                let tokens =
                    exchange_code_for_tokens(&self.http, &endpoints, &code, &pending.code_verifier)
                        .await?;
                let credential = Credential::OAuth2 {
                    expires_at: tokens.expires_at(Utc::now()),
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                };
                (instance, pending.user_id, credential)
            }
        };

        let account = instance
            .build_api_client(&self.http, &credential)
            .myself()
            .await?;
        let connection = Connection {
            instance_id: instance.id().clone(),
            platform_user_id: user_id,
            account,
            credential,
            settings: ConnectionSettings::default(),
            connected_at: Utc::now(),
        };
        self.store_new_connection(&connection).await?;

        tracing::info!(
            instance = %connection.instance_id,
            user = %connection.platform_user_id,
            account = %connection.account.account_id,
            "connected user to Jira"
        );
        Ok(connection)
    }

    async fn store_new_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let result = self.record_connection(connection).await;
        self.locks.cleanup_unused().await;
        result
    }

    async fn record_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let _conn_guard = self
            .locks
            .acquire(&connection_key(
                &connection.instance_id,
                &connection.platform_user_id,
            ))
            .await;
        self.users.store_connection(connection).await?;

        let _user_guard = self
            .locks
            .acquire(&user_key(&connection.platform_user_id))
            .await;
        let mut user = match self.users.load_user(&connection.platform_user_id).await {
            Ok(user) => user,
            Err(err) if err.is_not_found() => User::new(connection.platform_user_id.clone()),
            Err(err) => return Err(err),
        };
        if user.connect(connection.instance_id.clone()) {
            self.users.store_user(&user).await?;
        }
        Ok(())
    }

    /// Applies `key = value` to the connection's settings. Updates to the
    /// same (user, instance) never interleave.
    pub async fn update_setting(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
        key: &str,
        value: Option<&str>,
    ) -> Result<Connection, SettingsError> {
        if !key.eq_ignore_ascii_case("notifications") {
            return Err(SettingsError::UnknownSetting);
        }
        let notifications = match value.map(str::to_ascii_lowercase).as_deref() {
            Some("on") => true,
            Some("off") => false,
            _ => return Err(SettingsError::InvalidValue),
        };

        let result = self
            .set_notifications(instance_id, user_id, notifications)
            .await;
        self.locks.cleanup_unused().await;
        Ok(result?)
    }

    async fn set_notifications(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
        notifications: bool,
    ) -> Result<Connection, StoreError> {
        let _guard = self
            .locks
            .acquire(&connection_key(instance_id, user_id))
            .await;
        let mut connection = self.users.load_connection(instance_id, user_id).await?;
        if connection.settings.notifications != notifications {
            connection.settings.notifications = notifications;
            self.users.store_connection(&connection).await?;
        }
        Ok(connection)
    }

    /// Removes the link between `user_id` and `instance_id`. Unlinking
    /// something that is not linked succeeds.
    pub async fn unlink(&self, instance_id: &InstanceId, user_id: &UserId) -> Result<(), LinkError> {
        let result = self.remove_link(instance_id, user_id).await;
        self.locks.cleanup_unused().await;
        result?;
        tracing::info!(instance = %instance_id, user = %user_id, "disconnected user from Jira");
        Ok(())
    }

    async fn remove_link(
        &self,
        instance_id: &InstanceId,
        user_id: &UserId,
    ) -> Result<(), StoreError> {
        {
            let _guard = self
                .locks
                .acquire(&connection_key(instance_id, user_id))
                .await;
            self.users.delete_connection(instance_id, user_id).await?;
        }

        let _guard = self.locks.acquire(&user_key(user_id)).await;
        match self.users.load_user(user_id).await {
            Ok(mut user) => {
                if user.disconnect(instance_id) {
                    self.users.store_user(&user).await?;
                }
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Unlinks every user connected to the instance; returns how many.
    pub async fn unlink_all(&self, instance_id: &InstanceId) -> Result<usize, LinkError> {
        let users = self.users.load_instance_users(instance_id).await?;
        for user_id in &users {
            self.unlink(instance_id, user_id).await?;
        }
        Ok(users.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jirabridge_auth::KvSecretsStore;
    use jirabridge_schema::RemoteAccount;
    use jirabridge_store::{KvInstanceStore, KvUserStore, MemoryKv};

    fn manager(kv: Arc<dyn KvStore>) -> (Arc<dyn UserStore>, ConnectionManager) {
        let users: Arc<dyn UserStore> = Arc::new(KvUserStore::new(kv.clone()));
        let manager = ConnectionManager::new(
            Arc::new(KvInstanceStore::new(kv.clone())),
            users.clone(),
            Arc::new(KvSecretsStore::new(kv.clone())),
            kv,
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:8065").unwrap(),
        );
        (users, manager)
    }

    #[tokio::test]
    async fn lock_entries_are_dropped_once_released() {
        let (users, manager) = manager(Arc::new(MemoryKv::new()));
        let id = InstanceId::from("https://a.atlassian.net");

        for name in ["ann", "ben", "cat"] {
            let user = UserId::from(name);
            let connection = Connection {
                instance_id: id.clone(),
                platform_user_id: user.clone(),
                account: RemoteAccount {
                    account_id: format!("acc-{name}"),
                    display_name: name.to_uppercase(),
                    email: None,
                },
                credential: Credential::ApiToken {
                    email: "someone@example.com".into(),
                    token: "t".into(),
                },
                settings: ConnectionSettings::default(),
                connected_at: Utc::now(),
            };
            manager.store_new_connection(&connection).await.unwrap();
            manager
                .update_setting(&id, &user, "notifications", Some("off"))
                .await
                .unwrap();
            manager.unlink(&id, &user).await.unwrap();
        }

        assert_eq!(manager.locks.len().await, 0);
        assert!(users.load_instance_users(&id).await.unwrap().is_empty());
    }
}
