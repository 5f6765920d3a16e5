//! Key layout of the backing store.
//!
//! Identifiers are URLs and opaque platform ids, so every per-record key is a
//! fixed prefix plus a truncated SHA-256 of its parts. This keeps keys short
//! and free of separators regardless of input.

use jirabridge_schema::{InstanceId, UserId};
use sha2::{Digest, Sha256};

pub const INSTANCES_KEY: &str = "known_jira_instances";
pub const SIGNING_KEY: &str = "signing_key";
pub const WEBHOOK_SECRET_KEY: &str = "webhook_secret";

const HASH_LEN: usize = 32;

fn hashed(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0_u8]);
        }
        hasher.update(part.as_bytes());
    }
    let mut encoded = hex::encode(hasher.finalize());
    encoded.truncate(HASH_LEN);
    encoded
}

pub fn instance_key(instance_id: &InstanceId) -> String {
    format!("jira_instance_{}", hashed(&[instance_id.as_str()]))
}

pub fn user_key(user_id: &UserId) -> String {
    format!("user_{}", hashed(&[user_id.as_str()]))
}

pub fn connection_key(instance_id: &InstanceId, user_id: &UserId) -> String {
    format!("conn_{}", hashed(&[instance_id.as_str(), user_id.as_str()]))
}

pub fn account_key(instance_id: &InstanceId, account_id: &str) -> String {
    format!("acct_{}", hashed(&[instance_id.as_str(), account_id]))
}

pub fn instance_users_key(instance_id: &InstanceId) -> String {
    format!("instance_users_{}", hashed(&[instance_id.as_str()]))
}

pub fn oauth_state_key(state: &str) -> String {
    format!("oauth2_state_{}", hashed(&[state]))
}
