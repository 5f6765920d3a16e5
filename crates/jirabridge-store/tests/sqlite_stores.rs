use std::sync::Arc;

use chrono::Utc;
use jirabridge_schema::{
    Connection, ConnectionSettings, Credential, Instance, InstanceId, RemoteAccount, User, UserId,
};
use jirabridge_store::{
    InstanceStore, KvInstanceStore, KvStore, KvUserStore, SqliteKv, UserStore,
};
use tempfile::TempDir;

fn oauth_connection(instance: &InstanceId, user: &UserId) -> Connection {
    Connection {
        instance_id: instance.clone(),
        platform_user_id: user.clone(),
        account: RemoteAccount {
            account_id: "jdoe".into(),
            display_name: "Jane Doe".into(),
            email: Some("jane@example.com".into()),
        },
        credential: Credential::OAuth2 {
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: None,
        },
        settings: ConnectionSettings {
            notifications: false,
        },
        connected_at: Utc::now(),
    }
}

#[tokio::test]
async fn records_survive_reopening_the_database() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("data/jirabridge.db");
    let instance_id = InstanceId::from("https://jira.example.com");
    let user_id = UserId::from("user-1");

    {
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open(&path).unwrap());
        let instances = KvInstanceStore::new(kv.clone());
        let users = KvUserStore::new(kv);

        instances
            .store_instance(&Instance::server(instance_id.clone()))
            .await
            .unwrap();
        users
            .store_connection(&oauth_connection(&instance_id, &user_id))
            .await
            .unwrap();
        let mut user = User::new(user_id.clone());
        user.connect(instance_id.clone());
        users.store_user(&user).await.unwrap();
    }

    let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open(&path).unwrap());
    let instances = KvInstanceStore::new(kv.clone());
    let users = KvUserStore::new(kv);

    let registry = instances.load_instances().await.unwrap();
    assert_eq!(registry.default_id(), Some(&instance_id));

    let user = users.load_user(&user_id).await.unwrap();
    assert!(user.is_connected(&instance_id));

    let conn = users.load_connection(&instance_id, &user_id).await.unwrap();
    assert!(!conn.settings.notifications);
    assert_eq!(
        users
            .load_platform_user_id(&instance_id, "jdoe")
            .await
            .unwrap(),
        user_id
    );
}

#[tokio::test]
async fn orphan_connection_is_still_readable() {
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKv::open_in_memory().unwrap());
    let users = KvUserStore::new(kv);
    let instance_id = InstanceId::from("https://jira.example.com");
    let user_id = UserId::from("user-2");

    users
        .store_connection(&oauth_connection(&instance_id, &user_id))
        .await
        .unwrap();

    assert!(users.load_user(&user_id).await.unwrap_err().is_not_found());
    assert!(users.load_connection(&instance_id, &user_id).await.is_ok());
}
