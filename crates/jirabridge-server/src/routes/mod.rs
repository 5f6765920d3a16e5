pub mod command;
pub mod connect;
pub mod health;
pub mod oauth;
pub mod webhook;

use axum::{http::StatusCode, response::Html, Router};
use jirabridge_auth::AuthError;
use jirabridge_core::LinkError;

use crate::state::AppState;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/command", command::router())
        .nest("/instance", connect::router())
        .nest("/oauth2", oauth::router())
        .nest("/webhook", webhook::router())
        .nest("/health", health::router())
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Minimal page around already-escaped `body` markup.
fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n<h1>{}</h1>\n{body}\n</body></html>\n",
        escape_html(title),
        escape_html(title)
    ))
}

fn message_page(title: &str, message: &str) -> Html<String> {
    page(title, &format!("<p>{}</p>", escape_html(message)))
}

fn link_error_status(error: &LinkError) -> StatusCode {
    match error {
        _ if is_not_found(error) => StatusCode::NOT_FOUND,
        LinkError::Auth(
            AuthError::MalformedToken
            | AuthError::BadSignature
            | AuthError::TokenExpired
            | AuthError::UnknownState,
        )
        | LinkError::InstanceMismatch { .. } => StatusCode::BAD_REQUEST,
        LinkError::AlreadyConnected(_)
        | LinkError::OAuthNotConfigured(_)
        | LinkError::WrongVariant(..) => StatusCode::CONFLICT,
        LinkError::Auth(AuthError::TokenExchange(_)) | LinkError::Jira(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn is_not_found(error: &LinkError) -> bool {
    match error {
        LinkError::Store(err) | LinkError::Auth(AuthError::Store(err)) => err.is_not_found(),
        _ => false,
    }
}
