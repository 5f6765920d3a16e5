//! `/jira ...` command handling.
//!
//! Every command produces exactly one ephemeral reply to the invoking user.
//! Only platform-level failures (text not addressed to the trigger, reply
//! delivery) surface as errors.

mod assign;
mod connect;
pub mod help;
mod instances;
pub mod parse;
pub mod resolve;
mod settings;

use std::collections::HashMap;
use std::sync::Arc;

use jirabridge_schema::UserId;
use serde::Deserialize;

use crate::host::HostError;
use crate::Bridge;
use parse::{parse_command, Action, ParsedCommand};

pub use resolve::{resolve_instance, ResolveError};

#[derive(Debug, Clone, Deserialize)]
pub struct CommandArgs {
    pub command: String,
    pub user_id: UserId,
    #[serde(default)]
    pub channel_id: String,
    /// Mentioned usernames (without `@`) to platform user ids.
    #[serde(default)]
    pub user_mentions: HashMap<String, UserId>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("not a /{trigger} command: {command}")]
    NotACommand { trigger: String, command: String },
    #[error(transparent)]
    Host(#[from] HostError),
}

pub struct CommandRouter {
    bridge: Arc<Bridge>,
}

impl CommandRouter {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    fn trigger(&self) -> &str {
        &self.bridge.command_trigger
    }

    /// Runs the command and sends its reply; returns the reply text.
    pub async fn execute(&self, args: &CommandArgs) -> Result<String, CommandError> {
        let parsed = parse_command(&args.command, self.trigger()).ok_or_else(|| {
            CommandError::NotACommand {
                trigger: self.trigger().to_string(),
                command: args.command.clone(),
            }
        })?;
        tracing::debug!(user = %args.user_id, action = ?parsed.action, "dispatching command");

        let reply = self.dispatch(args, parsed).await;
        self.bridge
            .messenger
            .send_ephemeral(&args.channel_id, &args.user_id, &reply)
            .await?;
        Ok(reply)
    }

    async fn dispatch(&self, args: &CommandArgs, parsed: ParsedCommand) -> String {
        let instance = parsed.instance.as_deref();
        match parsed.action {
            Action::Help => self.help_for(&args.user_id).await,
            Action::Install(rest) => self.install(&args.user_id, &rest).await,
            Action::Uninstall(rest) => self.uninstall(&args.user_id, &rest).await,
            Action::InstanceOAuth(rest) => self.configure_oauth(&args.user_id, &rest, instance).await,
            Action::InstanceList => self.list_instances().await,
            Action::Settings(rest) => self.settings(&args.user_id, &rest, instance).await,
            Action::Assign(rest) => self.assign(args, &rest, instance).await,
            Action::Connect => self.connect(&args.user_id, instance).await,
            Action::Disconnect => self.disconnect(&args.user_id, instance).await,
        }
    }

    /// Users the directory does not know are not administrators.
    async fn is_system_admin(&self, user_id: &UserId) -> Result<bool, HostError> {
        match self.bridge.directory.get_user(user_id).await {
            Ok(user) => Ok(user.is_system_admin()),
            Err(HostError::UserNotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn help_for(&self, user_id: &UserId) -> String {
        let admin = self.is_system_admin(user_id).await.unwrap_or(false);
        help::help_text(self.trigger(), admin)
    }
}
