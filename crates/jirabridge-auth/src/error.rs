use jirabridge_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("stored signing key is invalid: {0}")]
    InvalidSigningKey(String),
    #[error("link token is malformed")]
    MalformedToken,
    #[error("link token signature is invalid")]
    BadSignature,
    #[error("link token has expired")]
    TokenExpired,
    #[error("authorization request not found or expired")]
    UnknownState,
    #[error("token exchange failed: {0}")]
    TokenExchange(String),
}
