//! End-to-end scenarios: a constructed service with its run-loops running

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use configstore::api::{router, ApiState};
use configstore::config::{ConfigStoreConfig, LtsConfig};
use configstore::{supervisor, ConfigStoreResult};

const SYNC_INTERVAL_MS: u64 = 50;

/// A running service and a router over the same handles
struct Running {
    app: Router,
    cancel: CancellationToken,
    run: JoinHandle<ConfigStoreResult<()>>,
}

impl Running {
    async fn start(mut config: ConfigStoreConfig) -> Self {
        config.readdb.sync_interval_ms = SYNC_INTERVAL_MS;
        let handles = supervisor::construct(&config).await.unwrap();
        let app = router(
            ApiState {
                commands: handles.commands.clone(),
                readdb: handles.readdb.clone(),
            },
            &handles.routes,
        );
        let cancel = CancellationToken::new();
        let run = tokio::spawn(supervisor::run(handles, cancel.clone()));
        Self { app, cancel, run }
    }

    async fn stop(self) {
        self.cancel.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), self.run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    /// Repeat a GET until `check` holds, for a few read model lag windows
    async fn poll_until<F>(&self, uri: &str, mut check: F) -> (StatusCode, Value)
    where
        F: FnMut(StatusCode, &Value) -> bool,
    {
        let mut last = (StatusCode::INTERNAL_SERVER_ERROR, Value::Null);
        for _ in 0..20 {
            last = self.call("GET", uri, None).await;
            if check(last.0, &last.1) {
                return last;
            }
            tokio::time::sleep(Duration::from_millis(SYNC_INTERVAL_MS)).await;
        }
        last
    }
}

#[tokio::test]
async fn test_created_project_becomes_visible() {
    let service = Running::start(ConfigStoreConfig::in_memory("127.0.0.1:0")).await;

    let (status, _) = service
        .call("PUT", "/api/v1alpha/projects", Some(json!({"name": "other"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, created) = service
        .call("PUT", "/api/v1alpha/projects", Some(json!({"name": "demo"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    // lag is allowed, another project's data is not
    let (status, body) = service.call("GET", "/api/v1alpha/projects/demo", None).await;
    match status {
        StatusCode::OK => assert_eq!(body["data"]["id"], id.as_str()),
        StatusCode::NOT_FOUND => assert_eq!(body["code"], "NOT_FOUND"),
        other => panic!("unexpected status {}", other),
    }

    let (status, body) = service
        .poll_until("/api/v1alpha/projects/demo", |status, body| {
            if status == StatusCode::OK {
                assert_eq!(body["data"]["id"], id.as_str());
            }
            status == StatusCode::OK
        })
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "demo");

    let (status, body) = service
        .call("GET", &format!("/api/v1alpha/project/{}", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "demo");

    service.stop().await;
}

#[tokio::test]
async fn test_deleted_user_becomes_not_found() {
    let service = Running::start(ConfigStoreConfig::in_memory("127.0.0.1:0")).await;

    let (status, created) = service
        .call("PUT", "/api/v1alpha/users", Some(json!({"user_name": "alice"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = service
        .poll_until("/api/v1alpha/users/alice", |status, _| status == StatusCode::OK)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = service.call("DELETE", "/api/v1alpha/users/alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["sequence_id"].as_u64().unwrap() > created["sequence_id"].as_u64().unwrap());

    let (status, _) = service
        .poll_until("/api/v1alpha/users/alice", |status, body| {
            if status == StatusCode::OK {
                // still the whole record until the delete is applied
                assert_eq!(body["data"]["id"], id.as_str());
                assert_eq!(body["data"]["user_name"], "alice");
            }
            status == StatusCode::NOT_FOUND
        })
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = service.call("DELETE", "/api/v1alpha/users/alice", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    service.stop().await;
}

#[tokio::test]
async fn test_linked_accounts_end_to_end() {
    let service = Running::start(ConfigStoreConfig::in_memory("127.0.0.1:0")).await;

    let (status, rs) = service
        .call(
            "PUT",
            "/api/v1alpha/remotesources",
            Some(json!({
                "name": "github",
                "api_url": "https://api.github.com",
                "type": "github",
                "auth_type": "oauth2",
                "oauth2_client_id": "client",
                "oauth2_client_secret": "secret",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let rs_id = rs["data"]["id"].as_str().unwrap().to_string();

    let (status, user) = service
        .call(
            "PUT",
            "/api/v1alpha/users",
            Some(json!({
                "user_name": "bob",
                "linked_account": {
                    "remote_source_name": "github",
                    "remote_user_id": "1001",
                    "remote_user_name": "bob-gh",
                },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let la_id = user["data"]["linked_accounts"]
        .as_object()
        .unwrap()
        .keys()
        .next()
        .unwrap()
        .clone();

    let (status, body) = service
        .call(
            "PUT",
            &format!("/api/v1alpha/users/bob/linkedaccounts/{}", la_id),
            Some(json!({"oauth2_access_token": "fresh"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["oauth2_access_token"], "fresh");

    let uri = format!(
        "/api/v1alpha/users?query_type=byremoteuser&remote_user_id=1001&remote_source_id={}",
        rs_id
    );
    let (status, body) = service
        .poll_until(&uri, |status, _| status == StatusCode::OK)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["user_name"], "bob");

    let (status, _) = service
        .call(
            "DELETE",
            &format!("/api/v1alpha/users/bob/linkedaccounts/{}", la_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    service.stop().await;
}

#[tokio::test]
async fn test_posix_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ConfigStoreConfig::in_memory("127.0.0.1:0");
    config.lts = LtsConfig::Posix {
        path: dir.path().to_path_buf(),
    };

    let first = Running::start(config.clone()).await;
    let (status, created) = first
        .call("PUT", "/api/v1alpha/projects", Some(json!({"name": "durable"})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    first.stop().await;

    let second = Running::start(config).await;
    let (status, body) = second
        .poll_until("/api/v1alpha/projects/durable", |status, _| {
            status == StatusCode::OK
        })
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], created["data"]["id"]);
    second.stop().await;
}
