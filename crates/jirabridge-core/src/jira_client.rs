//! The few Jira REST calls the bridge makes on behalf of a connected user.

use jirabridge_schema::{InstanceType, RemoteAccount};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum JiraError {
    #[error("request to Jira failed: {0}")]
    Request(String),
    #[error("Jira returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response from Jira: {0}")]
    InvalidResponse(String),
    #[error("Jira did not report an account identifier")]
    MissingIdentity,
}

#[derive(Debug, Clone)]
pub enum JiraAuth {
    Basic { email: String, token: String },
    Bearer(String),
}

/// `/rest/api/2/myself` payload. Cloud identifies accounts by `accountId`,
/// Server by `name`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JiraUser {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email_address: Option<String>,
}

impl JiraUser {
    pub fn into_account(self, instance_type: InstanceType) -> Result<RemoteAccount, JiraError> {
        let account_id = match instance_type {
            InstanceType::Cloud => self.account_id,
            InstanceType::Server => self.name.or(self.account_id),
        }
        .filter(|id| !id.is_empty())
        .ok_or(JiraError::MissingIdentity)?;

        Ok(RemoteAccount {
            account_id,
            display_name: self.display_name,
            email: self.email_address,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    http: reqwest::Client,
    base_url: String,
    instance_type: InstanceType,
    auth: JiraAuth,
}

impl JiraClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        instance_type: InstanceType,
        auth: JiraAuth,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            instance_type,
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            JiraAuth::Basic { email, token } => request.basic_auth(email, Some(token)),
            JiraAuth::Bearer(token) => request.bearer_auth(token),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, JiraError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read error body>".to_string());
        Err(JiraError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// The account the credentials belong to.
    pub async fn myself(&self) -> Result<RemoteAccount, JiraError> {
        let request = self.http.get(format!("{}/rest/api/2/myself", self.base_url));
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| JiraError::Request(e.to_string()))?;
        let user = Self::check(response)
            .await?
            .json::<JiraUser>()
            .await
            .map_err(|e| JiraError::InvalidResponse(e.to_string()))?;
        user.into_account(self.instance_type)
    }

    pub async fn assign_issue(
        &self,
        issue_key: &str,
        assignee: &RemoteAccount,
    ) -> Result<(), JiraError> {
        let body = match self.instance_type {
            InstanceType::Cloud => json!({ "accountId": assignee.account_id }),
            InstanceType::Server => json!({ "name": assignee.account_id }),
        };
        let url = format!(
            "{}/rest/api/2/issue/{}/assignee",
            self.base_url,
            urlencoding::encode(issue_key)
        );
        let response = self
            .authorize(self.http.put(url).json(&body))
            .send()
            .await
            .map_err(|e| JiraError::Request(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn account(id: &str) -> RemoteAccount {
        RemoteAccount {
            account_id: id.into(),
            display_name: "Someone".into(),
            email: None,
        }
    }

    #[tokio::test]
    async fn myself_uses_basic_auth_and_account_id_on_cloud() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/myself"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accountId": "5b10a2844c20165700ede21g",
                "displayName": "Mia Krystof",
                "emailAddress": "mia@example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = JiraClient::new(
            reqwest::Client::new(),
            &server.uri(),
            InstanceType::Cloud,
            JiraAuth::Basic {
                email: "mia@example.com".into(),
                token: "api-token".into(),
            },
        );
        let me = client.myself().await.unwrap();
        assert_eq!(me.account_id, "5b10a2844c20165700ede21g");
        assert_eq!(me.display_name, "Mia Krystof");
        assert_eq!(me.email.as_deref(), Some("mia@example.com"));
    }

    #[tokio::test]
    async fn myself_uses_username_on_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/myself"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "jdoe",
                "displayName": "Jane Doe"
            })))
            .mount(&server)
            .await;

        let client = JiraClient::new(
            reqwest::Client::new(),
            &server.uri(),
            InstanceType::Server,
            JiraAuth::Bearer("access-1".into()),
        );
        assert_eq!(client.myself().await.unwrap().account_id, "jdoe");
    }

    #[tokio::test]
    async fn myself_surfaces_rejected_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/myself"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = JiraClient::new(
            reqwest::Client::new(),
            &server.uri(),
            InstanceType::Cloud,
            JiraAuth::Bearer("stale".into()),
        );
        let err = client.myself().await.unwrap_err();
        assert_eq!(err.to_string(), "Jira returned status 401: Unauthorized");
    }

    #[tokio::test]
    async fn assign_sends_variant_specific_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/2/issue/MM-42/assignee"))
            .and(body_json(serde_json::json!({ "accountId": "acc-9" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/rest/api/2/issue/MM-43/assignee"))
            .and(body_json(serde_json::json!({ "name": "jdoe" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let auth = JiraAuth::Bearer("t".into());
        let cloud = JiraClient::new(
            reqwest::Client::new(),
            &server.uri(),
            InstanceType::Cloud,
            auth.clone(),
        );
        cloud.assign_issue("MM-42", &account("acc-9")).await.unwrap();

        let dc = JiraClient::new(reqwest::Client::new(), &server.uri(), InstanceType::Server, auth);
        dc.assign_issue("MM-43", &account("jdoe")).await.unwrap();
    }
}
