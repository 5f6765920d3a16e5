//! Incoming Jira webhooks: authenticate, resolve the instance, notify the
//! connected assignee.

use std::sync::Arc;

use jirabridge_auth::{secrets_match, AuthError};
use jirabridge_schema::{InstanceId, UserId};
use jirabridge_store::StoreError;
use serde::Deserialize;

use crate::command::resolve::{canonical_instance_id, resolve_instance, ResolveError};
use crate::host::HostError;
use crate::Bridge;

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook secret does not match")]
    Unauthorized,
    #[error("malformed webhook payload: {0}")]
    BadPayload(String),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Host(#[from] HostError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Notified(UserId),
    Ignored(String),
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(rename = "webhookEvent", default)]
    webhook_event: String,
    #[serde(default)]
    issue: Option<IssuePayload>,
}

#[derive(Debug, Deserialize)]
struct IssuePayload {
    key: String,
    #[serde(rename = "self", default)]
    self_url: Option<String>,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    assignee: Option<AssigneePayload>,
}

#[derive(Debug, Deserialize)]
struct AssigneePayload {
    #[serde(rename = "accountId", default)]
    account_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl AssigneePayload {
    /// Cloud identifies accounts by `accountId`, Server by `name`.
    fn account(&self) -> Option<&str> {
        self.account_id.as_deref().or(self.name.as_deref())
    }
}

fn event_verb(event: &str) -> Option<&'static str> {
    match event {
        "jira:issue_created" => Some("created"),
        "jira:issue_updated" => Some("updated"),
        "jira:issue_deleted" => Some("deleted"),
        _ => None,
    }
}

/// Base URL of the instance an issue's REST `self` link points into.
fn instance_base(self_url: &str) -> Option<InstanceId> {
    let (base, _) = self_url.split_once("/rest/")?;
    Some(canonical_instance_id(base))
}

pub struct WebhookDispatcher {
    bridge: Arc<Bridge>,
}

impl WebhookDispatcher {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    pub async fn handle(
        &self,
        secret: &str,
        instance_param: Option<&str>,
        payload: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        let expected = self.bridge.secrets.webhook_secret().await?;
        if !secrets_match(secret, &expected) {
            tracing::warn!("rejected webhook with invalid secret");
            return Err(WebhookError::Unauthorized);
        }

        let payload: WebhookPayload = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::BadPayload(e.to_string()))?;
        let Some(issue) = payload.issue else {
            return Ok(WebhookOutcome::Ignored(format!(
                "event {:?} carries no issue",
                payload.webhook_event
            )));
        };
        let Some(verb) = event_verb(&payload.webhook_event) else {
            return Ok(WebhookOutcome::Ignored(format!(
                "unsupported event {:?}",
                payload.webhook_event
            )));
        };

        let instance_id = self
            .resolve(instance_param, issue.self_url.as_deref())
            .await?;
        let Some(account) = issue.fields.assignee.as_ref().and_then(AssigneePayload::account)
        else {
            return Ok(WebhookOutcome::Ignored(format!("{} has no assignee", issue.key)));
        };

        let user_id = match self
            .bridge
            .users
            .load_platform_user_id(&instance_id, account)
            .await
        {
            Ok(user_id) => user_id,
            Err(err) if err.is_not_found() => {
                return Ok(WebhookOutcome::Ignored(format!(
                    "assignee {account} is not connected"
                )))
            }
            Err(err) => return Err(err.into()),
        };
        let connection = match self.bridge.users.load_connection(&instance_id, &user_id).await {
            Ok(connection) => connection,
            Err(err) if err.is_not_found() => {
                return Ok(WebhookOutcome::Ignored(format!(
                    "assignee {account} is not connected"
                )))
            }
            Err(err) => return Err(err.into()),
        };
        if !connection.settings.notifications {
            return Ok(WebhookOutcome::Ignored(format!(
                "notifications are off for {user_id}"
            )));
        }

        let text = format!(
            "Jira issue {} \"{}\" was {verb}. {instance_id}/browse/{}",
            issue.key, issue.fields.summary, issue.key
        );
        self.bridge.messenger.send_direct(&user_id, &text).await?;
        tracing::info!(instance = %instance_id, user = %user_id, issue = %issue.key, "sent issue notification");
        Ok(WebhookOutcome::Notified(user_id))
    }

    async fn resolve(
        &self,
        instance_param: Option<&str>,
        self_url: Option<&str>,
    ) -> Result<InstanceId, WebhookError> {
        if let Some(raw) = instance_param.filter(|raw| !raw.trim().is_empty()) {
            return Ok(resolve_instance(self.bridge.instances.as_ref(), Some(raw)).await?);
        }
        if let Some(id) = self_url.and_then(instance_base) {
            let instances = self.bridge.instances.load_instances().await?;
            if instances.contains(&id) {
                return Ok(id);
            }
        }
        Ok(resolve_instance(self.bridge.instances.as_ref(), None).await?)
    }
}
