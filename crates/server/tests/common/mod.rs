//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock generators injected, enabling end-to-end story runs without a
//! generation service.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use storyreel_core::{
    config::{DatabaseConfig, ServerConfig},
    create_audit_system,
    testing::MockGenerators,
    AuditStore, Config, PipelineConfig, PipelineController, RecoveryConfig, SqliteAuditStore,
    SqliteStoryStore, StoryStore,
};
use storyreel_server::state::AppState;

/// Re-export fixtures for test convenience
pub use storyreel_core::testing::fixtures;

/// Test fixture for E2E testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_story_creation() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/stories", json!({
///         "name": "Test",
///         "storyTypeId": "portrait",
///         "sourceContent": "A cat learns to fly"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock generators - inject failures, delays, inspect calls
    pub mocks: MockGenerators,
    /// Direct store access for setup and assertions
    pub store: Arc<SqliteStoryStore>,
    pub audit_store: Arc<SqliteAuditStore>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            pipeline: PipelineConfig::default(),
            recovery: RecoveryConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };

        let store = Arc::new(SqliteStoryStore::new(&db_path).expect("Failed to create story store"));
        let audit_store =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));

        let (audit_handle, audit_writer) =
            create_audit_system(Arc::clone(&audit_store) as Arc<dyn AuditStore>, 100);
        tokio::spawn(audit_writer.run());

        let mocks = MockGenerators::new();
        let controller = Arc::new(
            PipelineController::new(
                Arc::clone(&store) as Arc<dyn StoryStore>,
                mocks.generators(),
                config.pipeline.clone(),
            )
            .with_audit(audit_handle.clone()),
        );

        let state = Arc::new(AppState::new(
            config,
            Arc::clone(&store) as Arc<dyn StoryStore>,
            audit_handle,
            Arc::clone(&audit_store) as Arc<dyn AuditStore>,
            controller,
        ));

        let router = storyreel_server::api::create_router(state);

        Self {
            router,
            mocks,
            store,
            audit_store,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Fetch a text endpoint (metrics).
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Create a story through the API and return its id.
    pub async fn create_story(&self, body: Value) -> String {
        let response = self.post("/api/v1/stories", body).await;
        assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
        response.body["id"]
            .as_str()
            .expect("response has an id")
            .to_string()
    }

    /// Call the advance endpoint until the story is done.
    pub async fn advance_until_done(&self, story_id: &str) -> TestResponse {
        let path = format!("/api/v1/stories/{}", story_id);
        for _ in 0..50 {
            let response = self.post_empty(&path).await;
            assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
            if response.body["done"] == true {
                return response;
            }
            if response.body["retryAfter"].is_number() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        panic!("story {} did not finish", story_id);
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
