//! Secret material, signed link tokens and the OAuth 2.0 handshake used to
//! connect chat users to Jira.

pub mod error;
pub mod oauth2;
pub mod secrets;
pub mod token;

pub use error::AuthError;
pub use oauth2::{
    build_authorize_url, exchange_code_for_tokens, generate_pkce_pair, generate_state,
    store_pending_authorization, take_pending_authorization, OAuth2Endpoints,
    PendingAuthorization, PkcePair, TokenResponse, PENDING_AUTHORIZATION_TTL,
};
pub use secrets::{secrets_match, KvSecretsStore, SecretsStore};
pub use token::{issue_link_token, verify_link_token, LinkClaims, LINK_TOKEN_TTL};
