//! Outbound delivery of bridge messages to the chat platform.

use async_trait::async_trait;
use jirabridge_core::{HostError, Messenger};
use jirabridge_schema::UserId;
use serde::Serialize;
use url::Url;

#[derive(Debug, Serialize)]
struct Notification<'a> {
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
    user_id: &'a UserId,
    text: &'a str,
}

/// Posts each message as JSON to the platform's incoming webhook. Without a
/// webhook URL messages are only logged.
pub struct WebhookMessenger {
    http: reqwest::Client,
    url: Option<Url>,
}

impl WebhookMessenger {
    pub fn new(http: reqwest::Client, url: Option<Url>) -> Self {
        Self { http, url }
    }

    async fn post(&self, url: &Url, notification: &Notification<'_>) -> Result<(), HostError> {
        let response = self
            .http
            .post(url.clone())
            .json(notification)
            .send()
            .await
            .map_err(|e| HostError::Delivery(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Delivery(format!(
                "notify webhook returned {status}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for WebhookMessenger {
    async fn send_ephemeral(
        &self,
        channel_id: &str,
        user_id: &UserId,
        text: &str,
    ) -> Result<(), HostError> {
        let Some(url) = &self.url else {
            tracing::debug!(channel = channel_id, user = %user_id, "ephemeral reply: {text}");
            return Ok(());
        };
        self.post(
            url,
            &Notification {
                kind: "ephemeral",
                channel_id: Some(channel_id),
                user_id,
                text,
            },
        )
        .await
    }

    async fn send_direct(&self, user_id: &UserId, text: &str) -> Result<(), HostError> {
        let Some(url) = &self.url else {
            tracing::info!(user = %user_id, "direct message: {text}");
            return Ok(());
        };
        self.post(
            url,
            &Notification {
                kind: "direct",
                channel_id: None,
                user_id,
                text,
            },
        )
        .await
    }
}
