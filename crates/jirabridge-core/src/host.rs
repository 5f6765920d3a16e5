//! Boundary to the chat platform hosting the bridge: user lookup, message
//! delivery and outbound HTTP probing.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jirabridge_schema::UserId;

use crate::config::DirectoryUserConfig;

pub const SYSTEM_ADMIN_ROLE: &str = "system_admin";

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("platform user \"{0}\" not found")]
    UserNotFound(UserId),
    #[error("failed to deliver message: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformUser {
    pub id: UserId,
    pub username: String,
    pub roles: Vec<String>,
}

impl PlatformUser {
    pub fn is_system_admin(&self) -> bool {
        self.roles.iter().any(|role| role == SYSTEM_ADMIN_ROLE)
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: &UserId) -> Result<PlatformUser, HostError>;
}

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Reply visible only to `user_id` in `channel_id`.
    async fn send_ephemeral(
        &self,
        channel_id: &str,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), HostError>;

    /// Direct message from the bridge to `user_id`.
    async fn send_direct(&self, user_id: &UserId, text: &str) -> Result<(), HostError>;
}

/// Users known from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<UserId, PlatformUser>,
}

impl StaticUserDirectory {
    pub fn new(users: impl IntoIterator<Item = PlatformUser>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.id.clone(), u)).collect(),
        }
    }

    pub fn from_config(users: &[DirectoryUserConfig]) -> Self {
        Self::new(users.iter().map(|u| PlatformUser {
            id: UserId::new(u.id.clone()),
            username: u.username.clone(),
            roles: u.roles.clone(),
        }))
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn get_user(&self, user_id: &UserId) -> Result<PlatformUser, HostError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| HostError::UserNotFound(user_id.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// Plain GET used to check a candidate instance before it is installed.
#[async_trait]
pub trait HttpProbe: Send + Sync {
    /// Transport failures are returned as their error text.
    async fn get(&self, url: &str) -> Result<ProbeResponse, String>;
}

pub struct ReqwestProbe {
    http: reqwest::Client,
    timeout: Duration,
}

impl ReqwestProbe {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, String> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(ProbeResponse { status, body })
    }
}
