use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use backforge::models::{
    Endpoint, HttpMethod, Module, NewEndpoint, NewModule, NewProject, NewTask, Project, ProjectPatch,
    ProjectStatus, Task, WorkStatus,
};
use backforge::server::{build_app, ApiKeyStore, AppState};
use backforge::store::{ChangeKind, EntityStore, HttpStore, SqliteStore, StoreError};
use backforge::sync::{NoticeSink, TasksSync};
use backforge::waitlist::{join_waitlist, SignupOutcome};

struct TestServer {
    url: String,
    store: SqliteStore,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("server.db"), 2)
            .await
            .unwrap();
        let keys = ApiKeyStore::from_entries([("key-ada", "ada"), ("key-bob", "bob")]);
        let app = build_app(AppState::new(store.clone(), keys));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            url: format!("http://{}", addr),
            store,
            _dir: dir,
        }
    }

    fn client(&self, key: &str) -> HttpStore {
        HttpStore::new(self.url.as_str(), key)
    }
}

async fn create_project(store: &HttpStore, name: &str) -> Project {
    let account = store.me().await.unwrap();
    EntityStore::<Project>::insert(store, account.id, NewProject::new(name))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_and_auth() {
    let server = TestServer::start().await;
    let http = reqwest::Client::new();

    let health = http
        .get(format!("{}/health", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);

    let missing = http
        .get(format!("{}/api/v1/me", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 401);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "missing_auth");

    let invalid = http
        .get(format!("{}/api/v1/me", server.url))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 401);

    let account = server.client("key-ada").me().await.unwrap();
    assert_eq!(account.user_id, "ada");
    let again = server.client("key-ada").me().await.unwrap();
    assert_eq!(again.id, account.id);
}

#[tokio::test]
async fn test_project_crud_and_quota() {
    let server = TestServer::start().await;
    let ada = server.client("key-ada");
    let account = ada.me().await.unwrap();

    let shop = create_project(&ada, "Shop").await;
    assert_eq!(shop.code, "SHO-001");
    create_project(&ada, "Blog").await;

    let err = EntityStore::<Project>::insert(&ada, account.id, NewProject::new("Wiki"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Server { status: 403, .. }));

    let err = EntityStore::<Project>::update(
        &ada,
        shop.id,
        ProjectPatch::status(ProjectStatus::Deployed),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StoreError::Server { status: 400, .. }));

    let updated = EntityStore::<Project>::update(
        &ada,
        shop.id,
        ProjectPatch::status(ProjectStatus::Generating),
    )
    .await
    .unwrap();
    assert_eq!(updated.status, ProjectStatus::Generating);

    EntityStore::<Project>::delete(&ada, shop.id).await.unwrap();
    let snapshot = EntityStore::<Project>::query(&ada, account.id).await.unwrap();
    let names: Vec<&str> = snapshot.rows.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Blog"]);

    let err = EntityStore::<Project>::delete(&ada, shop.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[tokio::test]
async fn test_children_are_checked_and_private() {
    let server = TestServer::start().await;
    let ada = server.client("key-ada");
    let bob = server.client("key-bob");
    let project = create_project(&ada, "Shop").await;

    EntityStore::<Module>::insert(&ada, project.id, NewModule::new("users"))
        .await
        .unwrap();
    let err = EntityStore::<Module>::insert(&ada, project.id, NewModule::new("users"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Server { status: 400, .. }));

    let err = EntityStore::<Endpoint>::insert(
        &ada,
        project.id,
        NewEndpoint::new("billing", HttpMethod::Get, "/invoices"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, StoreError::Server { status: 400, .. }));

    let endpoint = EntityStore::<Endpoint>::insert(
        &ada,
        project.id,
        NewEndpoint::new("users", HttpMethod::Get, "/users"),
    )
    .await
    .unwrap();
    assert!(endpoint.auth_required);

    let err = EntityStore::<Module>::query(&bob, project.id).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    let err = EntityStore::<Endpoint>::delete(&bob, endpoint.id)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
    assert_eq!(
        EntityStore::<Endpoint>::query(&ada, project.id)
            .await
            .unwrap()
            .rows
            .len(),
        1
    );
}

#[tokio::test]
async fn test_change_feed_delivers_writes() {
    let server = TestServer::start().await;
    let ada = server.client("key-ada");
    let project = create_project(&ada, "Shop").await;

    let mut changes = EntityStore::<Task>::subscribe(&ada, project.id).await.unwrap();

    let task = EntityStore::<Task>::insert(&ada, project.id, NewTask::new("Schema", "core"))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), changes.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, ChangeKind::Insert);
    assert_eq!(event.id, task.id);
    assert_eq!(event.scope, project.id);
    assert!(event.revision > 0);

    let bob = server.client("key-bob");
    assert!(EntityStore::<Task>::subscribe(&bob, project.id).await.is_err());
}

#[tokio::test]
async fn test_remote_cache_follows_server_writes() {
    let server = TestServer::start().await;
    let ada = Arc::new(server.client("key-ada"));
    let project = create_project(&ada, "Shop").await;

    let board = TasksSync::new(ada.clone(), NoticeSink::discard());
    assert!(board.set_project(Some(project.id)).await);
    let mut updates = board.cache().updates();

    // A write made on the server side, outside this client.
    EntityStore::<Task>::insert(
        &server.store,
        project.id,
        NewTask::new("Routes", "api").with_status(WorkStatus::InProgress),
    )
    .await
    .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while board.tasks().await.is_empty() {
            updates.changed().await.unwrap();
        }
    })
    .await
    .unwrap();

    let grouped = board.grouped().await;
    let in_progress = grouped
        .iter()
        .find(|(status, _)| *status == WorkStatus::InProgress)
        .map(|(_, tasks)| tasks.len());
    assert_eq!(in_progress, Some(1));
}

#[tokio::test]
async fn test_waitlist_is_public_and_idempotent() {
    let server = TestServer::start().await;
    let anonymous = server.client("");

    let first = join_waitlist(&anonymous, " Ada@Example.com", None, None)
        .await
        .unwrap();
    assert!(matches!(first, SignupOutcome::Joined(ref s) if s.email == "ada@example.com"));

    let second = join_waitlist(&anonymous, "ada@example.com", Some("footer"), None)
        .await
        .unwrap();
    assert_eq!(second, SignupOutcome::AlreadyJoined);

    let http = reqwest::Client::new();
    let invalid = http
        .post(format!("{}/api/v1/waitlist", server.url))
        .json(&serde_json::json!({ "email": "not-an-email" }))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), 400);
}
