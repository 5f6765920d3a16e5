use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use url::Url;

/// Canonical identifier of an installed Jira instance: its normalized URL.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Scheme, host, optional port and path, never with a trailing slash.
    pub fn from_url(url: &Url) -> Self {
        let mut id = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
        if let Some(port) = url.port() {
            id.push(':');
            id.push_str(&port.to_string());
        }
        id.push_str(url.path().trim_end_matches('/'));
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Chat platform user id.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Cloud,
    Server,
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceType::Cloud => write!(f, "cloud"),
            InstanceType::Server => write!(f, "server"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown instance type {0:?}, expected `cloud` or `server`")]
pub struct UnknownInstanceType(pub String);

impl FromStr for InstanceType {
    type Err = UnknownInstanceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloud" => Ok(InstanceType::Cloud),
            "server" => Ok(InstanceType::Server),
            _ => Err(UnknownInstanceType(s.to_string())),
        }
    }
}

/// How users of an instance prove their identity when linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    ApiToken,
    OAuth2,
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthKind::ApiToken => write!(f, "API token"),
            AuthKind::OAuth2 => write!(f, "OAuth 2.0"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudInstance {
    pub id: InstanceId,
    #[serde(default)]
    pub alias: Option<String>,
    pub installed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInstance {
    pub id: InstanceId,
    #[serde(default)]
    pub alias: Option<String>,
    pub installed_at: DateTime<Utc>,
    /// Application link credentials, configured by an administrator after install.
    #[serde(default)]
    pub oauth_client: Option<OAuthClient>,
}

/// Full record of an installed instance, keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Instance {
    Cloud(CloudInstance),
    Server(ServerInstance),
}

impl Instance {
    pub fn cloud(id: InstanceId) -> Self {
        Instance::Cloud(CloudInstance {
            id,
            alias: None,
            installed_at: Utc::now(),
        })
    }

    pub fn server(id: InstanceId) -> Self {
        Instance::Server(ServerInstance {
            id,
            alias: None,
            installed_at: Utc::now(),
            oauth_client: None,
        })
    }

    pub fn id(&self) -> &InstanceId {
        match self {
            Instance::Cloud(cloud) => &cloud.id,
            Instance::Server(server) => &server.id,
        }
    }

    pub fn instance_type(&self) -> InstanceType {
        match self {
            Instance::Cloud(_) => InstanceType::Cloud,
            Instance::Server(_) => InstanceType::Server,
        }
    }

    pub fn auth_kind(&self) -> AuthKind {
        match self {
            Instance::Cloud(_) => AuthKind::ApiToken,
            Instance::Server(_) => AuthKind::OAuth2,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Instance::Cloud(cloud) => cloud.alias.as_deref(),
            Instance::Server(server) => server.alias.as_deref(),
        }
    }

    pub fn meta(&self) -> InstanceMeta {
        InstanceMeta {
            id: self.id().clone(),
            instance_type: self.instance_type(),
            alias: self.alias().map(str::to_string),
        }
    }

    pub fn url(&self) -> Result<Url, url::ParseError> {
        Url::parse(self.id().as_str())
    }
}

/// Registry entry for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMeta {
    pub id: InstanceId,
    #[serde(rename = "type")]
    pub instance_type: InstanceType,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Insertion-ordered registry of installed instances.
///
/// `default_id` is maintained on every mutation: it is set exactly when one
/// instance is registered and always references that instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instances {
    #[serde(default)]
    entries: IndexMap<InstanceId, InstanceMeta>,
    #[serde(default, rename = "default")]
    default_id: Option<InstanceId>,
}

impl Instances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &InstanceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &InstanceId) -> Option<&InstanceMeta> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceMeta> {
        self.entries.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &InstanceId> {
        self.entries.keys()
    }

    pub fn default_id(&self) -> Option<&InstanceId> {
        self.default_id.as_ref()
    }

    pub fn set(&mut self, meta: InstanceMeta) {
        self.entries.insert(meta.id.clone(), meta);
        self.refresh_default();
    }

    pub fn delete(&mut self, id: &InstanceId) -> Option<InstanceMeta> {
        let removed = self.entries.shift_remove(id);
        self.refresh_default();
        removed
    }

    fn refresh_default(&mut self) {
        self.default_id = if self.entries.len() == 1 {
            self.entries.keys().next().cloned()
        } else {
            None
        };
    }
}

/// Per-platform-user membership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub platform_user_id: UserId,
    #[serde(default)]
    pub connected_instances: IndexSet<InstanceId>,
}

impl User {
    pub fn new(platform_user_id: UserId) -> Self {
        Self {
            platform_user_id,
            connected_instances: IndexSet::new(),
        }
    }

    pub fn is_connected(&self, instance_id: &InstanceId) -> bool {
        self.connected_instances.contains(instance_id)
    }

    /// Returns `true` when the set changed.
    pub fn connect(&mut self, instance_id: InstanceId) -> bool {
        self.connected_instances.insert(instance_id)
    }

    /// Returns `true` when the set changed.
    pub fn disconnect(&mut self, instance_id: &InstanceId) -> bool {
        self.connected_instances.shift_remove(instance_id)
    }
}

/// Identity of the linked account on the Jira side. For Cloud `account_id` is
/// the Atlassian account id, for Server it is the username.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAccount {
    pub account_id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credential {
    ApiToken {
        email: String,
        token: String,
    },
    OAuth2 {
        access_token: String,
        #[serde(default)]
        refresh_token: Option<String>,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub notifications: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            notifications: true,
        }
    }
}

impl ConnectionSettings {
    pub fn notifications_label(&self) -> &'static str {
        if self.notifications {
            "on"
        } else {
            "off"
        }
    }
}

/// The authenticated link between one platform user and one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub instance_id: InstanceId,
    pub platform_user_id: UserId,
    pub account: RemoteAccount,
    pub credential: Credential,
    #[serde(default)]
    pub settings: ConnectionSettings,
    pub connected_at: DateTime<Utc>,
}
