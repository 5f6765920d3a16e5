use jirabridge_store::StoreError;

use super::resolve::resolve_instance;
use super::{CommandArgs, CommandRouter};
use crate::instance::InstanceCapabilities;

impl CommandRouter {
    /// `assign <issue-key> <@mention>`
    pub(super) async fn assign(
        &self,
        args: &CommandArgs,
        rest: &[String],
        requested: Option<&str>,
    ) -> String {
        let [issue_key, mention] = rest else {
            return format!(
                "Please specify an issue key and an assignee search string, in the form `/{} assign <issue-key> <assignee>`.",
                self.trigger()
            );
        };

        let username = mention.trim_start_matches('@');
        let Some(assignee_id) = args.user_mentions.get(username) else {
            return "the mentioned user was not found".to_string();
        };

        let instance_id = match resolve_instance(self.bridge.instances.as_ref(), requested).await {
            Ok(id) => id,
            Err(err) => return err.to_string(),
        };
        let assignee = match self
            .bridge
            .users
            .load_connection(&instance_id, assignee_id)
            .await
        {
            Ok(connection) => connection,
            Err(StoreError::ConnectionNotFound { .. }) => {
                tracing::warn!(
                    instance = %instance_id,
                    assignee = %assignee_id,
                    "assign target has no Jira connection"
                );
                return "the mentioned user is not connected to Jira".to_string();
            }
            Err(err) => return err.to_string(),
        };

        let acting = match self
            .bridge
            .users
            .load_connection(&instance_id, &args.user_id)
            .await
        {
            Ok(connection) => connection,
            Err(err) => {
                return format!("Failed to load your connection to Jira. Error: {err}.")
            }
        };
        let instance = match self.bridge.instances.load_instance(&instance_id).await {
            Ok(instance) => instance,
            Err(err) => return err.to_string(),
        };

        let client = instance.build_api_client(&self.bridge.http, &acting.credential);
        match client.assign_issue(issue_key, &assignee.account).await {
            Ok(()) => format!(
                "`{issue_key}` assigned to Jira user {}.",
                assignee.account.display_name
            ),
            Err(err) => format!("Failed to assign `{issue_key}`: {err}"),
        }
    }
}
