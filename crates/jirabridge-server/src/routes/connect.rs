use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Form, Router,
};
use jirabridge_core::Redemption;
use jirabridge_schema::InstanceId;
use serde::Deserialize;

use super::{escape_html, link_error_status, message_page, page};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectForm {
    pub token: String,
    pub email: String,
    pub api_token: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}/connect", get(connect_page).post(submit_connect))
}

/// Form asking for the Atlassian account email and API token.
pub async fn connect_page(
    Path(instance_id): Path<String>,
    Query(params): Query<ConnectParams>,
) -> (StatusCode, Html<String>) {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            message_page(
                "Link expired",
                "This page needs a link token. Run the connect command again.",
            ),
        );
    };

    let body = format!(
        "<p>Connect your account on {instance}.</p>\n\
         <form method=\"post\">\n\
         <input type=\"hidden\" name=\"token\" value=\"{token}\">\n\
         <label>Atlassian account email <input type=\"email\" name=\"email\" required></label>\n\
         <label>API token <input type=\"password\" name=\"api_token\" required></label>\n\
         <button type=\"submit\">Connect</button>\n\
         </form>",
        instance = escape_html(&instance_id),
        token = escape_html(&token),
    );
    (StatusCode::OK, page("Connect to Jira", &body))
}

pub async fn submit_connect(
    State(state): State<AppState>,
    Path(instance_id): Path<String>,
    Form(form): Form<ConnectForm>,
) -> (StatusCode, Html<String>) {
    let redemption = Redemption::ApiToken {
        instance_id: InstanceId::from(instance_id.as_str()),
        link_token: form.token,
        email: form.email,
        api_token: form.api_token,
    };
    match state.bridge.connections.complete_link(redemption).await {
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
            tracing::warn!(instance = %instance_id, error = %err, "connect page submission failed");
            (
                link_error_status(&err),
                message_page("Could not connect", &err.to_string()),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use jirabridge_schema::{Instance, InstanceId, UserId};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::create_router;
    use crate::state::testing::test_state;

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn page_without_token_is_rejected() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/instance/https%3A%2F%2Fa.atlassian.net/connect")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn page_embeds_the_token() {
        let app = create_router(test_state());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/instance/https%3A%2F%2Fa.atlassian.net/connect?token=abc.def")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("name=\"token\" value=\"abc.def\""));
        assert!(html.contains("https://a.atlassian.net"));
    }

    #[tokio::test]
    async fn submitting_the_form_links_the_account() {
        let jira = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/myself"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accountId": "acc-1",
                "displayName": "Ann Example"
            })))
            .mount(&jira)
            .await;

        let state = test_state();
        let id = InstanceId::from(jira.uri().as_str());
        let user = UserId::from("u1");
        state
            .bridge
            .instances
            .store_instance(&Instance::cloud(id.clone()))
            .await
            .unwrap();
        let handshake = state.bridge.connections.begin_link(&id, &user).await.unwrap();
        let token = handshake.url.split("?token=").nth(1).unwrap().to_string();

        let form = format!(
            "token={token}&email={}&api_token=secret",
            urlencoding::encode("ann@example.com")
        );
        let response = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!(
                        "/api/instance/{}/connect",
                        urlencoding::encode(id.as_str())
                    ))
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(form))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("as Ann Example."));
        let connection = state.bridge.users.load_connection(&id, &user).await.unwrap();
        assert_eq!(connection.account.account_id, "acc-1");
    }

    #[tokio::test]
    async fn token_for_another_instance_is_refused() {
        let state = test_state();
        let issued_for = InstanceId::from("https://a.atlassian.net");
        let submitted_to = InstanceId::from("https://b.atlassian.net");
        let user = UserId::from("u1");
        for id in [&issued_for, &submitted_to] {
            state
                .bridge
                .instances
                .store_instance(&Instance::cloud(id.clone()))
                .await
                .unwrap();
        }
        let handshake = state
            .bridge
            .connections
            .begin_link(&issued_for, &user)
            .await
            .unwrap();
        let token = handshake.url.split("?token=").nth(1).unwrap().to_string();

        let response = create_router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!(
                        "/api/instance/{}/connect",
                        urlencoding::encode(submitted_to.as_str())
                    ))
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(format!(
                        "token={token}&email=ann%40example.com&api_token=secret"
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Run the connect command again."));
        for id in [&issued_for, &submitted_to] {
            assert!(state.bridge.users.load_connection(id, &user).await.is_err());
        }
    }

    #[tokio::test]
    async fn bad_token_is_a_bad_request() {
        let response = create_router(test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/instance/x/connect")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from("token=garbage&email=a%40b.c&api_token=t"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
