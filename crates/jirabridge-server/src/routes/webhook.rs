use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use jirabridge_core::command::ResolveError;
use jirabridge_core::{WebhookError, WebhookOutcome};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    #[serde(default)]
    pub secret: String,
    pub instance: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(receive))
}

pub async fn receive(
    State(state): State<AppState>,
    Query(params): Query<WebhookParams>,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, String)> {
    let outcome = state
        .webhooks
        .handle(&params.secret, params.instance.as_deref(), &body)
        .await
        .map_err(|err| (webhook_error_status(&err), err.to_string()))?;

    Ok(Json(match outcome {
        WebhookOutcome::Notified(user_id) => json!({ "status": "notified", "user_id": user_id }),
        WebhookOutcome::Ignored(reason) => json!({ "status": "ignored", "reason": reason }),
    }))
}

fn webhook_error_status(error: &WebhookError) -> StatusCode {
    match error {
        WebhookError::Unauthorized => StatusCode::UNAUTHORIZED,
        WebhookError::BadPayload(_) => StatusCode::BAD_REQUEST,
        WebhookError::Resolve(ResolveError::NotFound(_) | ResolveError::NoInstances) => {
            StatusCode::NOT_FOUND
        }
        WebhookError::Resolve(ResolveError::Ambiguous) => StatusCode::BAD_REQUEST,
        WebhookError::Host(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
