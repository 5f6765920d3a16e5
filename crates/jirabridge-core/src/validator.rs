//! Pre-install checks for a candidate Jira URL.

use std::sync::Arc;

use jirabridge_schema::{Instance, InstanceId, InstanceType};
use serde::Deserialize;
use url::Url;

use crate::host::HttpProbe;
use crate::instance::InstanceCapabilities;

/// Hosts under these domains are Atlassian Cloud sites.
pub const CLOUD_HOST_SUFFIXES: [&str; 3] = ["atlassian.net", "jira.com", "jira-dev.com"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("`{url}` is not a valid URL: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("a secure HTTPS URL is required")]
    InsecureUrl,
    #[error("{0} is the Mattermost site URL. Please use your Jira URL with `/jira install`.")]
    SiteUrl(InstanceId),
    #[error("`{0}` is not a Jira server URL, it refers to Jira Cloud. Please use `/jira install cloud {0}` instead.")]
    CloudUrlAsServer(InstanceId),
    #[error("we couldn't validate the connection to your Jira server. This could be because of existing firewall or proxy rules, or because the URL was entered incorrectly: {0}")]
    Unreachable(ProbeFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    /// `code` is the HTTP status, or the transport error text when no
    /// response arrived.
    #[error("Jira server returned http status code \"{code}\" when checking for availability: \"{url}\"")]
    Status { code: String, url: InstanceId },
    #[error("{0}")]
    MalformedStatus(String),
    #[error("Jira server is not in correct state, it should be up and running: \"{0}\"")]
    NotRunning(InstanceId),
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    state: String,
}

pub fn is_cloud_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    CLOUD_HOST_SUFFIXES
        .iter()
        .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
}

/// Parses user input into an https URL; input without a scheme is taken as https.
pub fn normalize_url(raw: &str) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|e| ValidationError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    if url.scheme() != "https" {
        return Err(ValidationError::InsecureUrl);
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidUrl {
            url: trimmed.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

pub struct InstallationValidator {
    site_id: InstanceId,
    probe: Arc<dyn HttpProbe>,
}

impl InstallationValidator {
    pub fn new(site_url: &Url, probe: Arc<dyn HttpProbe>) -> Self {
        Self {
            site_id: InstanceId::from_url(site_url),
            probe,
        }
    }

    /// Checks run in order and stop at the first failure; nothing is
    /// persisted here.
    pub async fn validate(
        &self,
        raw_url: &str,
        instance_type: InstanceType,
    ) -> Result<InstanceId, ValidationError> {
        let url = normalize_url(raw_url)?;
        let id = InstanceId::from_url(&url);
        if id == self.site_id {
            return Err(ValidationError::SiteUrl(id));
        }

        let candidate = match instance_type {
            InstanceType::Cloud => Instance::cloud(id),
            InstanceType::Server => Instance::server(id),
        };
        candidate.check_url()?;

        self.check_status(candidate.id())
            .await
            .map_err(ValidationError::Unreachable)?;
        Ok(candidate.id().clone())
    }

    async fn check_status(&self, id: &InstanceId) -> Result<(), ProbeFailure> {
        let response = self
            .probe
            .get(&format!("{id}/status"))
            .await
            .map_err(|error| ProbeFailure::Status {
                code: error,
                url: id.clone(),
            })?;
        if response.status != 200 {
            return Err(ProbeFailure::Status {
                code: response.status.to_string(),
                url: id.clone(),
            });
        }

        let status: StatusResponse = serde_json::from_str(&response.body)
            .map_err(|e| ProbeFailure::MalformedStatus(e.to_string()))?;
        if status.state != "RUNNING" {
            return Err(ProbeFailure::NotRunning(id.clone()));
        }
        Ok(())
    }
}
