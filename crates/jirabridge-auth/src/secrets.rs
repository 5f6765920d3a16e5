use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{SigningKey, VerifyingKey};
use jirabridge_store::keys::{SIGNING_KEY, WEBHOOK_SECRET_KEY};
use jirabridge_store::{load_json, store_json_if_absent, KvStore};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tokio::sync::OnceCell;

use crate::AuthError;

/// Long-lived secrets of a deployment, generated on first use.
#[async_trait]
pub trait SecretsStore: Send + Sync {
    /// Key used to sign link tokens.
    async fn signing_key(&self) -> Result<SigningKey, AuthError>;

    async fn verifying_key(&self) -> Result<VerifyingKey, AuthError> {
        Ok(self.signing_key().await?.verifying_key())
    }

    /// Shared secret Jira must present when delivering webhooks.
    async fn webhook_secret(&self) -> Result<String, AuthError>;
}

pub struct KvSecretsStore {
    kv: Arc<dyn KvStore>,
    signing_key: OnceCell<SigningKey>,
    webhook_secret: OnceCell<String>,
}

impl KvSecretsStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            signing_key: OnceCell::new(),
            webhook_secret: OnceCell::new(),
        }
    }

    /// Returns the stored value under `key`, generating and storing one if
    /// absent. Concurrent generators, in this process or another one sharing
    /// the store, all end up with the first value written.
    async fn ensure_secret<F>(&self, key: &str, generate: F) -> Result<String, AuthError>
    where
        F: FnOnce() -> String + Send,
    {
        if let Some(existing) = load_json::<String>(self.kv.as_ref(), key).await? {
            return Ok(existing);
        }

        let generated = generate();
        if store_json_if_absent(self.kv.as_ref(), key, &generated).await? {
            tracing::info!(key, "generated new secret");
            return Ok(generated);
        }

        tracing::debug!(key, "secret was generated concurrently, using stored value");
        Ok(load_json::<String>(self.kv.as_ref(), key)
            .await?
            .unwrap_or(generated))
    }
}

#[async_trait]
impl SecretsStore for KvSecretsStore {
    async fn signing_key(&self) -> Result<SigningKey, AuthError> {
        let key = self
            .signing_key
            .get_or_try_init(|| async {
                let encoded = self
                    .ensure_secret(SIGNING_KEY, || {
                        hex::encode(SigningKey::generate(&mut OsRng).to_bytes())
                    })
                    .await?;
                decode_signing_key(&encoded)
            })
            .await?;
        Ok(key.clone())
    }

    async fn webhook_secret(&self) -> Result<String, AuthError> {
        let secret = self
            .webhook_secret
            .get_or_try_init(|| async {
                self.ensure_secret(WEBHOOK_SECRET_KEY, || {
                    let mut bytes = [0_u8; 32];
                    OsRng.fill_bytes(&mut bytes);
                    hex::encode(bytes)
                })
                .await
            })
            .await?;
        Ok(secret.clone())
    }
}

fn decode_signing_key(encoded: &str) -> Result<SigningKey, AuthError> {
    let bytes = hex::decode(encoded)
        .map_err(|e| AuthError::InvalidSigningKey(format!("invalid hex: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AuthError::InvalidSigningKey("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Constant-time comparison of a presented secret against the expected one.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
