use std::sync::Arc;

use jirabridge_core::{Bridge, CommandRouter, WebhookDispatcher};

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
    pub commands: Arc<CommandRouter>,
    pub webhooks: Arc<WebhookDispatcher>,
}

impl AppState {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self {
            commands: Arc::new(CommandRouter::new(bridge.clone())),
            webhooks: Arc::new(WebhookDispatcher::new(bridge.clone())),
            bridge,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;
    use jirabridge_core::{
        Bridge, BridgeParts, HttpProbe, PlatformUser, ProbeResponse, StaticUserDirectory,
    };
    use jirabridge_schema::UserId;
    use jirabridge_store::MemoryKv;
    use url::Url;

    use super::AppState;
    use crate::notify::WebhookMessenger;

    pub const ADMIN: &str = "admin-1";

    struct OfflineProbe;

    #[async_trait]
    impl HttpProbe for OfflineProbe {
        async fn get(&self, url: &str) -> Result<ProbeResponse, String> {
            Err(format!("offline: {url}"))
        }
    }

    pub fn test_state() -> AppState {
        let directory = StaticUserDirectory::new([PlatformUser {
            id: UserId::from(ADMIN),
            username: "admin".into(),
            roles: vec!["system_admin".into()],
        }]);
        let bridge = Bridge::new(BridgeParts {
            kv: Arc::new(MemoryKv::new()),
            directory: Arc::new(directory),
            messenger: Arc::new(WebhookMessenger::new(reqwest::Client::new(), None)),
            probe: Arc::new(OfflineProbe),
            http: reqwest::Client::new(),
            site_url: Url::parse("https://chat.example.com").unwrap(),
            public_url: Url::parse("http://127.0.0.1:8065").unwrap(),
            command_trigger: "jira".into(),
        });
        AppState::new(Arc::new(bridge))
    }
}
