use std::fmt::Display;

use jirabridge_schema::UserId;
use jirabridge_store::StoreError;

use super::resolve::resolve_instance;
use super::CommandRouter;
use crate::connection::SettingsError;

fn load_failure(err: impl Display) -> String {
    format!("Failed to load your connection to Jira. Error: {err}.")
}

impl CommandRouter {
    /// `settings [notifications [on|off]]`
    pub(super) async fn settings(
        &self,
        user_id: &UserId,
        args: &[String],
        requested: Option<&str>,
    ) -> String {
        // A connection written without its user record is still usable, so a
        // missing user only surfaces when no connection can be found either.
        let missing_user = match self.bridge.users.load_user(user_id).await {
            Ok(_) => None,
            Err(err @ StoreError::UserNotFound(_)) => Some(err),
            Err(err) => return load_failure(err),
        };
        let instance_id = match resolve_instance(self.bridge.instances.as_ref(), requested).await {
            Ok(id) => id,
            Err(err) => {
                return match missing_user {
                    Some(missing) => load_failure(missing),
                    None => load_failure(err),
                }
            }
        };
        let connection = match self.bridge.users.load_connection(&instance_id, user_id).await {
            Ok(connection) => connection,
            Err(err) => return load_failure(missing_user.unwrap_or(err)),
        };

        let Some(key) = args.first() else {
            return format!(
                "Current settings:\n\tNotifications: {}",
                connection.settings.notifications_label()
            );
        };

        match self
            .bridge
            .connections
            .update_setting(&instance_id, user_id, key, args.get(1).map(String::as_str))
            .await
        {
            Ok(updated) => format!(
                "Settings updated. Notifications {}.",
                updated.settings.notifications_label()
            ),
            Err(SettingsError::Store(err)) => load_failure(err),
            Err(err) => err.to_string(),
        }
    }
}
