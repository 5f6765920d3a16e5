use jirabridge_schema::{AuthKind, UserId};

use super::resolve::resolve_instance;
use super::CommandRouter;
use crate::connection::LinkError;

impl CommandRouter {
    /// `connect`
    pub(super) async fn connect(&self, user_id: &UserId, requested: Option<&str>) -> String {
        let instance_id = match resolve_instance(self.bridge.instances.as_ref(), requested).await {
            Ok(id) => id,
            Err(err) => return err.to_string(),
        };

        match self.bridge.connections.begin_link(&instance_id, user_id).await {
            Ok(handshake) => match handshake.kind {
                AuthKind::ApiToken => format!(
                    "[Click here to link your Jira account]({}) on {instance_id}. You will need an Atlassian API token.",
                    handshake.url
                ),
                AuthKind::OAuth2 => format!(
                    "[Click here to link your Jira account]({}) on {instance_id}.",
                    handshake.url
                ),
            },
            Err(err @ LinkError::AlreadyConnected(_)) => err.to_string(),
            Err(err @ LinkError::OAuthNotConfigured(_)) => err.to_string(),
            Err(err) => {
                tracing::warn!(instance = %instance_id, user = %user_id, error = %err, "failed to begin link");
                format!("Failed to start connecting to {instance_id}: {err}")
            }
        }
    }

    /// `disconnect`
    pub(super) async fn disconnect(&self, user_id: &UserId, requested: Option<&str>) -> String {
        let instance_id = match resolve_instance(self.bridge.instances.as_ref(), requested).await {
            Ok(id) => id,
            Err(err) => return err.to_string(),
        };

        match self.bridge.connections.unlink(&instance_id, user_id).await {
            Ok(()) => format!("You have disconnected your account from {instance_id}."),
            Err(err) => format!("Failed to disconnect from {instance_id}: {err}"),
        }
    }
}
