use jirabridge_schema::InstanceId;
use jirabridge_store::{InstanceStore, StoreError};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("instance \"{0}\" not found")]
    NotFound(String),
    #[error("no Jira instances have been installed")]
    NoInstances,
    #[error("multiple Jira instances are installed, please specify one with --instance")]
    Ambiguous,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Canonical id for a user-typed instance URL, without enforcing https.
pub fn canonical_instance_id(raw: &str) -> InstanceId {
    let trimmed = raw.trim();
    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some() => InstanceId::from_url(&url),
        _ => InstanceId::new(trimmed.trim_end_matches('/')),
    }
}

/// Picks the instance a command applies to: the explicit `--instance`, or
/// the only installed one.
pub async fn resolve_instance(
    store: &dyn InstanceStore,
    requested: Option<&str>,
) -> Result<InstanceId, ResolveError> {
    let instances = store.load_instances().await?;

    if let Some(raw) = requested {
        let id = canonical_instance_id(raw);
        return if instances.contains(&id) {
            Ok(id)
        } else {
            Err(ResolveError::NotFound(raw.trim().to_string()))
        };
    }

    match instances.len() {
        0 => Err(ResolveError::NoInstances),
        1 => instances
            .default_id()
            .cloned()
            .ok_or(ResolveError::NoInstances),
        _ => Err(ResolveError::Ambiguous),
    }
}
