//! Short-lived signed tokens carrying an (instance, user) pair to the connect
//! page.
//!
//! Format: `base64url(json claims) "." base64url(ed25519 signature)`, where the
//! signature covers the encoded claims segment.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use jirabridge_schema::{InstanceId, UserId};
use serde::{Deserialize, Serialize};

use crate::AuthError;

pub const LINK_TOKEN_TTL: Duration = Duration::from_secs(15 * 60);

fn ttl() -> chrono::Duration {
    chrono::Duration::seconds(LINK_TOKEN_TTL.as_secs() as i64)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkClaims {
    pub instance_id: InstanceId,
    pub user_id: UserId,
    pub expires_at: DateTime<Utc>,
    pub nonce: String,
}

pub fn issue_link_token(
    key: &SigningKey,
    instance_id: &InstanceId,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> String {
    let claims = LinkClaims {
        instance_id: instance_id.clone(),
        user_id: user_id.clone(),
        expires_at: now + ttl(),
        nonce: uuid::Uuid::new_v4().simple().to_string(),
    };
    // Serializing plain strings and a timestamp cannot fail.
    let payload = serde_json::to_vec(&claims).unwrap_or_default();
    let encoded = URL_SAFE_NO_PAD.encode(payload);
    let signature = key.sign(encoded.as_bytes());
    format!("{encoded}.{}", URL_SAFE_NO_PAD.encode(signature.to_bytes()))
}

pub fn verify_link_token(
    key: &VerifyingKey,
    token: &str,
    now: DateTime<Utc>,
) -> Result<LinkClaims, AuthError> {
    let (encoded, signature) = token.split_once('.').ok_or(AuthError::MalformedToken)?;

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| AuthError::MalformedToken)?;
    let signature: [u8; 64] = signature
        .try_into()
        .map_err(|_| AuthError::MalformedToken)?;
    key.verify(encoded.as_bytes(), &Signature::from_bytes(&signature))
        .map_err(|_| AuthError::BadSignature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| AuthError::MalformedToken)?;
    let claims: LinkClaims =
        serde_json::from_slice(&payload).map_err(|_| AuthError::MalformedToken)?;
    if claims.expires_at <= now {
        return Err(AuthError::TokenExpired);
    }
    Ok(claims)
}
