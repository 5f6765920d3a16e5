//! Instance registry, user connections, command routing and webhook handling
//! for the chat-to-Jira bridge.

pub mod command;
pub mod config;
pub mod connection;
pub mod host;
pub mod instance;
pub mod jira_client;
pub mod validator;
pub mod webhook;

pub use command::{CommandArgs, CommandError, CommandRouter};
pub use config::*;
pub use connection::{ConnectionManager, LinkError, Redemption, SettingsError};
pub use host::*;
pub use instance::{AuthHandshake, HandshakeContext, InstanceCapabilities};
pub use jira_client::{JiraAuth, JiraClient, JiraError};
pub use validator::{InstallationValidator, ProbeFailure, ValidationError};
pub use webhook::{WebhookDispatcher, WebhookError, WebhookOutcome};

use std::sync::Arc;

use jirabridge_auth::{KvSecretsStore, SecretsStore};
use jirabridge_store::{InstanceStore, KvInstanceStore, KvStore, KvUserStore, UserStore};
use url::Url;

/// Host-provided pieces the bridge is assembled from.
pub struct BridgeParts {
    pub kv: Arc<dyn KvStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub messenger: Arc<dyn Messenger>,
    pub probe: Arc<dyn HttpProbe>,
    pub http: reqwest::Client,
    pub site_url: Url,
    pub public_url: Url,
    pub command_trigger: String,
}

/// Shared state behind every command and webhook.
pub struct Bridge {
    pub kv: Arc<dyn KvStore>,
    pub instances: Arc<dyn InstanceStore>,
    pub users: Arc<dyn UserStore>,
    pub secrets: Arc<dyn SecretsStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub messenger: Arc<dyn Messenger>,
    pub validator: InstallationValidator,
    pub connections: ConnectionManager,
    pub http: reqwest::Client,
    pub public_url: Url,
    pub command_trigger: String,
}

impl Bridge {
    pub fn new(parts: BridgeParts) -> Self {
        let instances: Arc<dyn InstanceStore> = Arc::new(KvInstanceStore::new(parts.kv.clone()));
        let users: Arc<dyn UserStore> = Arc::new(KvUserStore::new(parts.kv.clone()));
        let secrets: Arc<dyn SecretsStore> = Arc::new(KvSecretsStore::new(parts.kv.clone()));
        let connections = ConnectionManager::new(
            instances.clone(),
            users.clone(),
            secrets.clone(),
            parts.kv.clone(),
            parts.http.clone(),
            parts.public_url.clone(),
        );

        Self {
            kv: parts.kv,
            instances,
            users,
            secrets,
            directory: parts.directory,
            messenger: parts.messenger,
            validator: InstallationValidator::new(&parts.site_url, parts.probe),
            connections,
            http: parts.http,
            public_url: parts.public_url,
            command_trigger: parts.command_trigger,
        }
    }

    /// URL Jira should deliver webhooks for `instance_id` to.
    pub async fn webhook_url(
        &self,
        instance_id: &jirabridge_schema::InstanceId,
    ) -> Result<String, jirabridge_auth::AuthError> {
        let secret = self.secrets.webhook_secret().await?;
        Ok(format!(
            "{}/api/webhook?secret={}&instance={}",
            self.public_url.as_str().trim_end_matches('/'),
            urlencoding::encode(&secret),
            urlencoding::encode(instance_id.as_str())
        ))
    }
}
