use std::str::FromStr;

use jirabridge_schema::{Instance, InstanceType, OAuthClient, UserId};

use super::help::help_text;
use super::resolve::{canonical_instance_id, resolve_instance};
use super::CommandRouter;
use crate::instance::oauth_callback_url;

impl CommandRouter {
    /// `install {cloud|server} <url>`
    pub(super) async fn install(&self, user_id: &UserId, args: &[String]) -> String {
        match self.is_system_admin(user_id).await {
            Ok(true) => {}
            Ok(false) => return help_text(self.trigger(), false),
            Err(err) => return err.to_string(),
        }
        let [variant, url] = args else {
            return help_text(self.trigger(), true);
        };
        let Ok(instance_type) = InstanceType::from_str(variant) else {
            return help_text(self.trigger(), true);
        };

        let id = match self.bridge.validator.validate(url, instance_type).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(url = %url, error = %err, "rejected instance install");
                return err.to_string();
            }
        };

        let instance = match self.bridge.instances.load_instance(&id).await {
            Ok(existing) if existing.instance_type() != instance_type => {
                return format!(
                    "`{id}` is already installed as a Jira {} instance.",
                    existing.instance_type()
                );
            }
            Ok(existing) => existing,
            Err(err) if err.is_not_found() => match instance_type {
                InstanceType::Cloud => Instance::cloud(id.clone()),
                InstanceType::Server => Instance::server(id.clone()),
            },
            Err(err) => return format!("Failed to install {id}: {err}"),
        };
        if let Err(err) = self.bridge.instances.store_instance(&instance).await {
            return format!("Failed to install {id}: {err}");
        }
        tracing::info!(instance = %id, instance_type = %instance_type, "installed Jira instance");

        let mut reply = format!("{id} has been successfully added. To finish the configuration, ");
        match instance_type {
            InstanceType::Cloud => reply.push_str(&format!(
                "users can run `/{} connect` and link their accounts with an Atlassian API token.",
                self.trigger()
            )),
            InstanceType::Server => reply.push_str(&format!(
                "create an incoming application link in Jira with the redirect URL {} and run `/{} instance oauth <client-id> <client-secret> --instance {id}`.",
                oauth_callback_url(&self.bridge.public_url),
                self.trigger()
            )),
        }
        match self.bridge.webhook_url(&id).await {
            Ok(webhook) => reply.push_str(&format!(
                "\nTo receive notifications, add a Jira webhook pointing to {webhook}"
            )),
            Err(err) => {
                tracing::warn!(instance = %id, error = %err, "webhook secret unavailable")
            }
        }
        reply
    }

    /// `uninstall {cloud|server} <url>`
    pub(super) async fn uninstall(&self, user_id: &UserId, args: &[String]) -> String {
        match self.is_system_admin(user_id).await {
            Ok(true) => {}
            Ok(false) => {
                return format!(
                    "`/{} uninstall` can only be run by a System Administrator.",
                    self.trigger()
                )
            }
            Err(err) => return err.to_string(),
        }
        let [variant, url] = args else {
            return help_text(self.trigger(), true);
        };
        let Ok(instance_type) = InstanceType::from_str(variant) else {
            return help_text(self.trigger(), true);
        };

        let id = canonical_instance_id(url);
        let instance = match self.bridge.instances.load_instance(&id).await {
            Ok(instance) => instance,
            Err(err) if err.is_not_found() => return format!("instance \"{id}\" not found"),
            Err(err) => return format!("Failed to uninstall {id}: {err}"),
        };
        if instance.instance_type() != instance_type {
            return format!(
                "`{id}` is a Jira {} instance, not {instance_type}.",
                instance.instance_type()
            );
        }

        // Connections go first so a failed cascade can be retried.
        let disconnected = match self.bridge.connections.unlink_all(&id).await {
            Ok(count) => count,
            Err(err) => {
                tracing::warn!(instance = %id, error = %err, "failed to disconnect users of instance");
                return format!("Failed to uninstall {id}: {err}");
            }
        };
        if let Err(err) = self.bridge.instances.delete_instance(&id).await {
            return format!("Failed to uninstall {id}: {err}");
        }
        tracing::info!(instance = %id, disconnected, "uninstalled Jira instance");
        format!("{id} has been successfully removed.")
    }

    /// `instance oauth <client-id> <client-secret>`
    pub(super) async fn configure_oauth(
        &self,
        user_id: &UserId,
        args: &[String],
        requested: Option<&str>,
    ) -> String {
        match self.is_system_admin(user_id).await {
            Ok(true) => {}
            Ok(false) => {
                return format!(
                    "`/{} instance oauth` can only be run by a System Administrator.",
                    self.trigger()
                )
            }
            Err(err) => return err.to_string(),
        }
        let [client_id, client_secret] = args else {
            return help_text(self.trigger(), true);
        };

        let id = match resolve_instance(self.bridge.instances.as_ref(), requested).await {
            Ok(id) => id,
            Err(err) => return err.to_string(),
        };
        let mut instance = match self.bridge.instances.load_instance(&id).await {
            Ok(instance) => instance,
            Err(err) => return err.to_string(),
        };
        let Instance::Server(server) = &mut instance else {
            return format!(
                "`{id}` is a Jira cloud instance. OAuth 2.0 applies to Jira server instances only."
            );
        };
        server.oauth_client = Some(OAuthClient {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
        });

        if let Err(err) = self.bridge.instances.store_instance(&instance).await {
            return format!("Failed to update {id}: {err}");
        }
        tracing::info!(instance = %id, "configured OAuth 2.0 client");
        format!(
            "OAuth 2.0 client configured for {id}. Users can now run `/{} connect`.",
            self.trigger()
        )
    }

    /// `instance list`
    pub(super) async fn list_instances(&self) -> String {
        let instances = match self.bridge.instances.load_instances().await {
            Ok(instances) => instances,
            Err(err) => return format!("Failed to load Jira instances: {err}"),
        };
        if instances.is_empty() {
            return "No Jira instances have been installed.".to_string();
        }

        let mut reply = String::from("Installed Jira instances:");
        for meta in instances.iter() {
            reply.push_str(&format!("\n* {} ({})", meta.id, meta.instance_type));
            if let Some(alias) = &meta.alias {
                reply.push_str(&format!(" \"{alias}\""));
            }
            if instances.default_id() == Some(&meta.id) {
                reply.push_str(" (default)");
            }
        }
        reply
    }
}
