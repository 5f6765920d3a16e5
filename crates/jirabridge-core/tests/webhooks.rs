use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use jirabridge_core::command::ResolveError;
use jirabridge_core::*;
use jirabridge_schema::{
    Connection, ConnectionSettings, Credential, Instance, InstanceId, RemoteAccount, UserId,
};
use jirabridge_store::{KvStore, MemoryKv};
use serde_json::json;
use url::Url;

#[derive(Default)]
struct DirectInbox(Mutex<Vec<(UserId, String)>>);

#[async_trait]
impl Messenger for DirectInbox {
    async fn send_ephemeral(
        &self,
        _channel_id: &str,
        _user_id: &UserId,
        _text: &str,
    ) -> Result<(), HostError> {
        Ok(())
    }

    async fn send_direct(&self, user_id: &UserId, text: &str) -> Result<(), HostError> {
        self.0.lock().unwrap().push((user_id.clone(), text.to_string()));
        Ok(())
    }
}

struct OfflineProbe;

#[async_trait]
impl HttpProbe for OfflineProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, String> {
        Err(format!("offline: {url}"))
    }
}

const CLOUD: &str = "https://a.atlassian.net";
const SERVER: &str = "https://jira.example.com";

async fn setup(instances: &[Instance]) -> (Arc<Bridge>, WebhookDispatcher, Arc<DirectInbox>, String) {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let inbox = Arc::new(DirectInbox::default());
    let bridge = Arc::new(Bridge::new(BridgeParts {
        kv,
        directory: Arc::new(StaticUserDirectory::default()),
        messenger: inbox.clone(),
        probe: Arc::new(OfflineProbe),
        http: reqwest::Client::new(),
        site_url: Url::parse("https://chat.example.com").unwrap(),
        public_url: Url::parse("http://127.0.0.1:8065").unwrap(),
        command_trigger: "jira".into(),
    }));

    for instance in instances {
        bridge.instances.store_instance(instance).await.unwrap();
        for (user, notify) in [("ann", true), ("ben", false)] {
            bridge
                .users
                .store_connection(&Connection {
                    instance_id: instance.id().clone(),
                    platform_user_id: UserId::from(user),
                    account: RemoteAccount {
                        account_id: format!("acc-{user}"),
                        display_name: user.to_string(),
                        email: None,
                    },
                    credential: Credential::ApiToken {
                        email: format!("{user}@example.com"),
                        token: "t".into(),
                    },
                    settings: ConnectionSettings {
                        notifications: notify,
                    },
                    connected_at: Utc::now(),
                })
                .await
                .unwrap();
        }
    }

    let secret = bridge.secrets.webhook_secret().await.unwrap();
    let dispatcher = WebhookDispatcher::new(bridge.clone());
    (bridge, dispatcher, inbox, secret)
}

fn issue_event(event: &str, base: &str, assignee: Option<&str>) -> Vec<u8> {
    let assignee = assignee.map(|account| json!({ "accountId": account }));
    serde_json::to_vec(&json!({
        "webhookEvent": event,
        "issue": {
            "key": "PRJ-7",
            "self": format!("{base}/rest/api/2/issue/10007"),
            "fields": {
                "summary": "Broken build",
                "assignee": assignee
            }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn wrong_secret_is_rejected() {
    let (_bridge, dispatcher, inbox, _secret) =
        setup(&[Instance::cloud(InstanceId::from(CLOUD))]).await;
    let err = dispatcher
        .handle("not-the-secret", None, &issue_event("jira:issue_updated", CLOUD, Some("acc-ann")))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::Unauthorized));
    assert!(inbox.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn assignee_with_notifications_gets_a_direct_message() {
    let (_bridge, dispatcher, inbox, secret) =
        setup(&[Instance::cloud(InstanceId::from(CLOUD))]).await;
    let outcome = dispatcher
        .handle(&secret, None, &issue_event("jira:issue_updated", CLOUD, Some("acc-ann")))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Notified(UserId::from("ann")));

    let sent = inbox.0.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, UserId::from("ann"));
    assert_eq!(
        sent[0].1,
        "Jira issue PRJ-7 \"Broken build\" was updated. https://a.atlassian.net/browse/PRJ-7"
    );
}

#[tokio::test]
async fn muted_unknown_and_missing_assignees_are_ignored() {
    let (_bridge, dispatcher, inbox, secret) =
        setup(&[Instance::cloud(InstanceId::from(CLOUD))]).await;

    for assignee in [Some("acc-ben"), Some("acc-stranger"), None] {
        let outcome = dispatcher
            .handle(&secret, None, &issue_event("jira:issue_created", CLOUD, assignee))
            .await
            .unwrap();
        assert!(matches!(outcome, WebhookOutcome::Ignored(_)), "{assignee:?}");
    }

    let outcome = dispatcher
        .handle(&secret, None, &issue_event("comment_created", CLOUD, Some("acc-ann")))
        .await
        .unwrap();
    assert!(matches!(outcome, WebhookOutcome::Ignored(_)));
    assert!(inbox.0.lock().unwrap().is_empty());
}

#[tokio::test]
async fn instance_comes_from_parameter_or_issue_link() {
    let (_bridge, dispatcher, inbox, secret) = setup(&[
        Instance::cloud(InstanceId::from(CLOUD)),
        Instance::server(InstanceId::from(SERVER)),
    ])
    .await;

    let outcome = dispatcher
        .handle(&secret, None, &issue_event("jira:issue_deleted", SERVER, Some("acc-ann")))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Notified(UserId::from("ann")));

    let outcome = dispatcher
        .handle(
            &secret,
            Some("https://a.atlassian.net/"),
            &issue_event("jira:issue_updated", "https://proxy.example.com", Some("acc-ann")),
        )
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Notified(UserId::from("ann")));

    let sent = inbox.0.lock().unwrap();
    assert!(sent[0].1.ends_with("was deleted. https://jira.example.com/browse/PRJ-7"));
    assert!(sent[1].1.ends_with("https://a.atlassian.net/browse/PRJ-7"));
}

#[tokio::test]
async fn unresolvable_instance_and_bad_payloads_are_errors() {
    let (_bridge, dispatcher, _inbox, secret) = setup(&[
        Instance::cloud(InstanceId::from(CLOUD)),
        Instance::server(InstanceId::from(SERVER)),
    ])
    .await;

    let err = dispatcher
        .handle(
            &secret,
            None,
            &issue_event("jira:issue_updated", "https://elsewhere.example.com", Some("acc-ann")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::Resolve(ResolveError::Ambiguous)));

    let err = dispatcher
        .handle(
            &secret,
            Some("https://missing.example.com"),
            &issue_event("jira:issue_updated", CLOUD, Some("acc-ann")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::Resolve(ResolveError::NotFound(_))));

    let err = dispatcher
        .handle(&secret, None, b"{not json")
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::BadPayload(_)));
}
