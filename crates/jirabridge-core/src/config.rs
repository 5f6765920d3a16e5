use std::{collections::HashSet, fs, path::Path};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

fn default_command_trigger() -> String {
    "jira".to_string()
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_database() -> String {
    "data/jirabridge.db".to_string()
}

fn default_listen() -> String {
    "127.0.0.1:8065".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUserConfig {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Public URL of the chat platform. Installing it as a Jira instance is refused.
    pub site_url: String,
    /// Base URL under which this bridge serves its connect pages and callbacks.
    pub public_url: String,
    #[serde(default = "default_command_trigger")]
    pub command_trigger: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub notify_webhook_url: Option<String>,
    #[serde(default)]
    pub users: Vec<DirectoryUserConfig>,
}

impl BridgeConfig {
    pub fn site_url(&self) -> Result<Url> {
        Url::parse(&self.site_url).with_context(|| format!("invalid site_url: {}", self.site_url))
    }

    pub fn public_url(&self) -> Result<Url> {
        Url::parse(&self.public_url)
            .with_context(|| format!("invalid public_url: {}", self.public_url))
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

/// Loads `main.yaml` from the config directory, resolves `${VAR}`
/// placeholders and validates the result.
pub fn load_config(root: &Path) -> Result<BridgeConfig> {
    let mut config: BridgeConfig = read_yaml_file(&root.join("main.yaml"))?;
    resolve_config_env(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &BridgeConfig) -> Result<()> {
    config.site_url()?;
    config.public_url()?;

    if config.command_trigger.trim().is_empty() {
        return Err(anyhow!("command_trigger must not be empty"));
    }
    if config.http_timeout_secs == 0 {
        return Err(anyhow!("http_timeout_secs must be greater than zero"));
    }
    if let Some(url) = &config.notify_webhook_url {
        Url::parse(url).with_context(|| format!("invalid notify_webhook_url: {url}"))?;
    }

    let mut seen = HashSet::new();
    for user in &config.users {
        if !seen.insert(user.id.as_str()) {
            return Err(anyhow!("duplicate user id: {}", user.id));
        }
    }

    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn resolve_config_env(config: &mut BridgeConfig) {
    config.site_url = resolve_env_var(&config.site_url);
    config.public_url = resolve_env_var(&config.public_url);
    config.command_trigger = resolve_env_var(&config.command_trigger);
    config.database = resolve_env_var(&config.database);
    config.listen = resolve_env_var(&config.listen);

    // An unset variable disables outbound notifications.
    config.notify_webhook_url = config
        .notify_webhook_url
        .as_deref()
        .map(resolve_env_var)
        .filter(|url| !url.trim().is_empty());

    for user in &mut config.users {
        user.id = resolve_env_var(&user.id);
        user.username = resolve_env_var(&user.username);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn fixture_config_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
    }

    fn minimal() -> BridgeConfig {
        serde_yaml::from_str(
            "site_url: https://chat.example.com\npublic_url: https://bridge.example.com\n",
        )
        .unwrap()
    }

    #[test]
    fn load_config_from_workspace_fixtures() {
        let config = load_config(&fixture_config_root()).unwrap();
        assert_eq!(config.site_url, "https://chat.example.com");
        assert_eq!(config.command_trigger, "jira");
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(config.users.len(), 2);
        assert!(config.users[0].roles.contains(&"system_admin".to_string()));
    }

    #[test]
    fn defaults_apply_to_omitted_fields() {
        let config = minimal();
        assert_eq!(config.command_trigger, "jira");
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(config.database, "data/jirabridge.db");
        assert_eq!(config.listen, "127.0.0.1:8065");
        assert!(config.notify_webhook_url.is_none());
        assert!(config.users.is_empty());
        validate_config(&config).unwrap();
    }

    #[test]
    fn validate_config_detects_duplicate_user_id() {
        let mut config = minimal();
        let user = DirectoryUserConfig {
            id: "u1".into(),
            username: "alice".into(),
            roles: vec![],
        };
        config.users = vec![user.clone(), user];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate user id"));
    }

    #[test]
    fn validate_config_rejects_bad_values() {
        let mut config = minimal();
        config.command_trigger = "  ".into();
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("command_trigger"));

        let mut config = minimal();
        config.http_timeout_secs = 0;
        assert!(validate_config(&config).is_err());

        let mut config = minimal();
        config.site_url = "not a url".into();
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("site_url"));
    }

    #[test]
    fn unset_notify_url_placeholder_disables_notifications() {
        let mut config = minimal();
        config.notify_webhook_url = Some("${JIRABRIDGE_NONEXISTENT_VAR_XYZ}".into());
        resolve_config_env(&mut config);
        assert!(config.notify_webhook_url.is_none());
    }

    #[test]
    fn resolve_env_var_replaces_env_placeholder() {
        let expected = std::env::var("PATH").unwrap();
        assert_eq!(resolve_env_var("${PATH}"), expected);
    }

    #[test]
    fn resolve_env_var_unclosed_bracket() {
        assert_eq!(resolve_env_var("prefix_${UNCLOSED"), "prefix_${UNCLOSED");
    }

    #[test]
    fn resolve_env_var_missing_env_returns_empty() {
        assert_eq!(
            resolve_env_var("val=${JIRABRIDGE_NONEXISTENT_VAR_XYZ}"),
            "val="
        );
    }
}
