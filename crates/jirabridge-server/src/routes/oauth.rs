use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use jirabridge_core::Redemption;
use serde::Deserialize;

use super::{link_error_status, message_page};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: Option<String>,
    pub code: Option<String>,
    pub error: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/callback", get(callback))
}

/// Redirect target of the Jira Server authorization screen.
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    if let Some(error) = params.error {
        return (
            StatusCode::BAD_REQUEST,
            message_page("Authorization denied", &format!("Jira reported: {error}")),
        );
    }
    let (Some(oauth_state), Some(code)) = (params.state, params.code) else {
        return (
            StatusCode::BAD_REQUEST,
            message_page("Authorization failed", "Missing state or code parameter."),
        );
    };

    match state
        .bridge
        .connections
        .complete_link(Redemption::OAuth2 {
            state: oauth_state,
            code,
        })
        .await
    {
        Ok(connection) => {
            let text = format!(
                "Your account is now connected to {} as {}.",
                connection.instance_id, connection.account.display_name
            );
            if let Err(err) = state
                .bridge
                .messenger
                .send_direct(&connection.platform_user_id, &text)
                .await
            {
                tracing::warn!(user = %connection.platform_user_id, error = %err, "link confirmation not delivered");
            }
            (StatusCode::OK, message_page("Connected", &text))
        }
        Err(err) => {
            tracing::warn!(error = %err, "oauth callback failed");
            (
                link_error_status(&err),
                message_page("Authorization failed", &err.to_string()),
            )
        }
    }
}
