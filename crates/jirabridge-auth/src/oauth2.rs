//! OAuth 2.0 authorization-code flow with PKCE against Jira Server / Data
//! Center incoming application links.

use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use jirabridge_schema::{InstanceId, OAuthClient, UserId};
use jirabridge_store::keys::oauth_state_key;
use jirabridge_store::{load_json, store_json_with_expiry, KvStore};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::AuthError;

pub const PENDING_AUTHORIZATION_TTL: Duration = Duration::from_secs(15 * 60);

const JIRA_OAUTH_SCOPE: &str = "WRITE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

#[derive(Debug, Clone)]
pub struct OAuth2Endpoints {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub scope: String,
}

impl OAuth2Endpoints {
    /// Endpoints of a Jira Server instance rooted at `base_url`.
    pub fn for_jira_server(base_url: &str, client: &OAuthClient, redirect_uri: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            redirect_uri: redirect_uri.to_string(),
            authorize_endpoint: format!("{base}/rest/oauth2/latest/authorize"),
            token_endpoint: format!("{base}/rest/oauth2/latest/token"),
            scope: JIRA_OAUTH_SCOPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl TokenResponse {
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| now + chrono::Duration::seconds(secs))
    }
}

/// What the callback needs to finish a handshake it did not start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub instance_id: InstanceId,
    pub user_id: UserId,
    pub code_verifier: String,
}

pub fn generate_pkce_pair() -> PkcePair {
    let mut random = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut random);
    let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random);

    let challenge = {
        let digest = Sha256::digest(verifier.as_bytes());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
    };

    PkcePair {
        verifier,
        challenge,
    }
}

pub fn generate_state() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn build_authorize_url(endpoints: &OAuth2Endpoints, code_challenge: &str, state: &str) -> String {
    format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&code_challenge={}&code_challenge_method=S256&state={}",
        endpoints.authorize_endpoint,
        urlencoding::encode(&endpoints.client_id),
        urlencoding::encode(&endpoints.redirect_uri),
        urlencoding::encode(&endpoints.scope),
        urlencoding::encode(code_challenge),
        urlencoding::encode(state),
    )
}

pub async fn exchange_code_for_tokens(
    http: &reqwest::Client,
    endpoints: &OAuth2Endpoints,
    code: &str,
    code_verifier: &str,
) -> Result<TokenResponse, AuthError> {
    let payload = [
        ("grant_type", "authorization_code"),
        ("client_id", endpoints.client_id.as_str()),
        ("client_secret", endpoints.client_secret.as_str()),
        ("redirect_uri", endpoints.redirect_uri.as_str()),
        ("code", code),
        ("code_verifier", code_verifier),
    ];

    let response = http
        .post(&endpoints.token_endpoint)
        .header("content-type", "application/x-www-form-urlencoded")
        .form(&payload)
        .send()
        .await
        .map_err(|e| AuthError::TokenExchange(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        return Err(AuthError::TokenExchange(format!("({status}): {body}")));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| AuthError::TokenExchange(format!("invalid token response payload: {e}")))
}

pub async fn store_pending_authorization(
    kv: &dyn KvStore,
    state: &str,
    pending: &PendingAuthorization,
) -> Result<(), AuthError> {
    store_json_with_expiry(
        kv,
        &oauth_state_key(state),
        pending,
        PENDING_AUTHORIZATION_TTL,
    )
    .await?;
    Ok(())
}

/// Consumes the pending authorization for `state`; a state is redeemable once.
pub async fn take_pending_authorization(
    kv: &dyn KvStore,
    state: &str,
) -> Result<PendingAuthorization, AuthError> {
    let key = oauth_state_key(state);
    let pending: PendingAuthorization = load_json(kv, &key)
        .await?
        .ok_or(AuthError::UnknownState)?;
    kv.delete(&key).await?;
    Ok(pending)
}
