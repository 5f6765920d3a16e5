use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use jirabridge_core::{CommandArgs, CommandError};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub text: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(execute))
}

pub async fn execute(
    State(state): State<AppState>,
    Json(args): Json<CommandArgs>,
) -> Result<Json<CommandResponse>, (StatusCode, String)> {
    match state.commands.execute(&args).await {
        Ok(text) => Ok(Json(CommandResponse { text })),
        Err(err @ CommandError::NotACommand { .. }) => {
            Err((StatusCode::BAD_REQUEST, err.to_string()))
        }
        Err(CommandError::Host(err)) => {
            tracing::warn!(user = %args.user_id, error = %err, "command reply not delivered");
            Err((StatusCode::BAD_GATEWAY, err.to_string()))
        }
    }
}
