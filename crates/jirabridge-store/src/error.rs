use jirabridge_schema::{InstanceId, UserId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("instance \"{0}\" not found")]
    InstanceNotFound(InstanceId),
    #[error("user \"{0}\" not found")]
    UserNotFound(UserId),
    #[error("connection to \"{instance_id}\" for user \"{user_id}\" not found")]
    ConnectionNotFound {
        instance_id: InstanceId,
        user_id: UserId,
    },
    #[error("no user is connected to \"{instance_id}\" as Jira account \"{account_id}\"")]
    AccountNotFound {
        instance_id: InstanceId,
        account_id: String,
    },
    #[error("failed to decode value of {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode value of {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::InstanceNotFound(_)
                | StoreError::UserNotFound(_)
                | StoreError::ConnectionNotFound { .. }
                | StoreError::AccountNotFound { .. }
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}
