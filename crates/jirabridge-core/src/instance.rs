//! Variant-specific behavior of installed instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jirabridge_auth::{
    build_authorize_url, generate_pkce_pair, generate_state, issue_link_token,
    store_pending_authorization, OAuth2Endpoints, PendingAuthorization, SecretsStore,
};
use jirabridge_schema::{AuthKind, CloudInstance, Credential, Instance, ServerInstance, UserId};
use jirabridge_schema::{InstanceId, InstanceType};
use jirabridge_store::KvStore;
use url::Url;

use crate::connection::LinkError;
use crate::jira_client::{JiraAuth, JiraClient};
use crate::validator::{is_cloud_host, ValidationError};

/// Where a user goes to finish linking their account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHandshake {
    pub instance_id: InstanceId,
    pub kind: AuthKind,
    pub url: String,
}

pub struct HandshakeContext<'a> {
    pub public_url: &'a Url,
    pub secrets: &'a dyn SecretsStore,
    pub kv: &'a dyn KvStore,
    pub now: DateTime<Utc>,
}

#[async_trait]
pub trait InstanceCapabilities: Send + Sync {
    /// Rejects URLs that cannot belong to this variant.
    fn check_url(&self) -> Result<(), ValidationError>;

    async fn build_auth_handshake(
        &self,
        user_id: &UserId,
        ctx: &HandshakeContext<'_>,
    ) -> Result<AuthHandshake, LinkError>;

    fn build_api_client(&self, http: &reqwest::Client, credential: &Credential) -> JiraClient;
}

pub fn connect_page_url(public_url: &Url, instance_id: &InstanceId) -> String {
    format!(
        "{}/api/instance/{}/connect",
        public_url.as_str().trim_end_matches('/'),
        urlencoding::encode(instance_id.as_str())
    )
}

pub fn oauth_callback_url(public_url: &Url) -> String {
    format!(
        "{}/api/oauth2/callback",
        public_url.as_str().trim_end_matches('/')
    )
}

fn client_for(
    http: &reqwest::Client,
    id: &InstanceId,
    instance_type: InstanceType,
    credential: &Credential,
) -> JiraClient {
    let auth = match credential {
        Credential::ApiToken { email, token } => JiraAuth::Basic {
            email: email.clone(),
            token: token.clone(),
        },
        Credential::OAuth2 { access_token, .. } => JiraAuth::Bearer(access_token.clone()),
    };
    JiraClient::new(http.clone(), id.as_str(), instance_type, auth)
}

#[async_trait]
impl InstanceCapabilities for CloudInstance {
    fn check_url(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    async fn build_auth_handshake(
        &self,
        user_id: &UserId,
        ctx: &HandshakeContext<'_>,
    ) -> Result<AuthHandshake, LinkError> {
        let key = ctx.secrets.signing_key().await?;
        let token = issue_link_token(&key, &self.id, user_id, ctx.now);
        Ok(AuthHandshake {
            instance_id: self.id.clone(),
            kind: AuthKind::ApiToken,
            url: format!(
                "{}?token={}",
                connect_page_url(ctx.public_url, &self.id),
                urlencoding::encode(&token)
            ),
        })
    }

    fn build_api_client(&self, http: &reqwest::Client, credential: &Credential) -> JiraClient {
        client_for(http, &self.id, InstanceType::Cloud, credential)
    }
}

#[async_trait]
impl InstanceCapabilities for ServerInstance {
    fn check_url(&self) -> Result<(), ValidationError> {
        let is_cloud = Url::parse(self.id.as_str())
            .ok()
            .and_then(|url| url.host_str().map(is_cloud_host))
            .unwrap_or(false);
        if is_cloud {
            return Err(ValidationError::CloudUrlAsServer(self.id.clone()));
        }
        Ok(())
    }

    async fn build_auth_handshake(
        &self,
        user_id: &UserId,
        ctx: &HandshakeContext<'_>,
    ) -> Result<AuthHandshake, LinkError> {
        let client = self
            .oauth_client
            .as_ref()
            .ok_or_else(|| LinkError::OAuthNotConfigured(self.id.clone()))?;
        let endpoints = OAuth2Endpoints::for_jira_server(
            self.id.as_str(),
            client,
            &oauth_callback_url(ctx.public_url),
        );

        let pkce = generate_pkce_pair();
        let state = generate_state();
        store_pending_authorization(
            ctx.kv,
            &state,
            &PendingAuthorization {
                instance_id: self.id.clone(),
                user_id: user_id.clone(),
                code_verifier: pkce.verifier,
            },
        )
        .await?;

        Ok(AuthHandshake {
            instance_id: self.id.clone(),
            kind: AuthKind::OAuth2,
            url: build_authorize_url(&endpoints, &pkce.challenge, &state),
        })
    }

    fn build_api_client(&self, http: &reqwest::Client, credential: &Credential) -> JiraClient {
        client_for(http, &self.id, InstanceType::Server, credential)
    }
}

#[async_trait]
impl InstanceCapabilities for Instance {
    fn check_url(&self) -> Result<(), ValidationError> {
        match self {
            Instance::Cloud(cloud) => cloud.check_url(),
            Instance::Server(server) => server.check_url(),
        }
    }

    async fn build_auth_handshake(
        &self,
        user_id: &UserId,
        ctx: &HandshakeContext<'_>,
    ) -> Result<AuthHandshake, LinkError> {
        match self {
            Instance::Cloud(cloud) => cloud.build_auth_handshake(user_id, ctx).await,
            Instance::Server(server) => server.build_auth_handshake(user_id, ctx).await,
        }
    }

    fn build_api_client(&self, http: &reqwest::Client, credential: &Credential) -> JiraClient {
        match self {
            Instance::Cloud(cloud) => cloud.build_api_client(http, credential),
            Instance::Server(server) => server.build_api_client(http, credential),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jirabridge_auth::{take_pending_authorization, verify_link_token, KvSecretsStore};
    use jirabridge_schema::OAuthClient;
    use jirabridge_store::MemoryKv;
    use std::sync::Arc;

    fn public_url() -> Url {
        Url::parse("https://bridge.example.com/").unwrap()
    }

    #[test]
    fn server_rejects_cloud_hosts() {
        let server = Instance::server(InstanceId::from("https://mmtest.atlassian.net"));
        assert!(matches!(
            server.check_url(),
            Err(ValidationError::CloudUrlAsServer(_))
        ));
        let cloud = Instance::cloud(InstanceId::from("https://mmtest.atlassian.net"));
        assert!(cloud.check_url().is_ok());
        let server = Instance::server(InstanceId::from("https://jira.example.com"));
        assert!(server.check_url().is_ok());
    }

    #[test]
    fn connect_page_url_encodes_the_instance_id() {
        let url = connect_page_url(&public_url(), &InstanceId::from("https://a.atlassian.net"));
        assert_eq!(
            url,
            "https://bridge.example.com/api/instance/https%3A%2F%2Fa.atlassian.net/connect"
        );
        assert_eq!(
            oauth_callback_url(&public_url()),
            "https://bridge.example.com/api/oauth2/callback"
        );
    }

    #[tokio::test]
    async fn cloud_handshake_carries_a_verifiable_token() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let secrets = KvSecretsStore::new(kv.clone());
        let public = public_url();
        let now = Utc::now();
        let ctx = HandshakeContext {
            public_url: &public,
            secrets: &secrets,
            kv: kv.as_ref(),
            now,
        };
        let instance = Instance::cloud(InstanceId::from("https://a.atlassian.net"));
        let user = UserId::from("u1");

        let handshake = instance.build_auth_handshake(&user, &ctx).await.unwrap();
        assert_eq!(handshake.kind, AuthKind::ApiToken);
        let token = handshake.url.split("?token=").nth(1).unwrap();
        let token = urlencoding::decode(token).unwrap();
        let claims =
            verify_link_token(&secrets.verifying_key().await.unwrap(), &token, now).unwrap();
        assert_eq!(claims.user_id, user);
        assert_eq!(&claims.instance_id, instance.id());
    }

    #[tokio::test]
    async fn server_handshake_requires_oauth_client_and_stores_state() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let secrets = KvSecretsStore::new(kv.clone());
        let public = public_url();
        let ctx = HandshakeContext {
            public_url: &public,
            secrets: &secrets,
            kv: kv.as_ref(),
            now: Utc::now(),
        };
        let user = UserId::from("u1");

        let mut instance = Instance::server(InstanceId::from("https://jira.example.com"));
        let err = instance.build_auth_handshake(&user, &ctx).await.unwrap_err();
        assert!(matches!(err, LinkError::OAuthNotConfigured(_)));

        if let Instance::Server(server) = &mut instance {
            server.oauth_client = Some(OAuthClient {
                client_id: "cid".into(),
                client_secret: "csecret".into(),
            });
        }
        let handshake = instance.build_auth_handshake(&user, &ctx).await.unwrap();
        assert_eq!(handshake.kind, AuthKind::OAuth2);
        assert!(handshake
            .url
            .starts_with("https://jira.example.com/rest/oauth2/latest/authorize?"));

        let state = handshake
            .url
            .split('&')
            .find_map(|pair| pair.strip_prefix("state="))
            .unwrap();
        let pending = take_pending_authorization(kv.as_ref(), state).await.unwrap();
        assert_eq!(pending.user_id, user);
        assert_eq!(&pending.instance_id, instance.id());
    }
}
