//! Common test utilities for in-process API testing.
//!
//! This module provides a test fixture that builds the full router over
//! SQLite stores in a temporary directory, so requests exercise the real
//! catalog, ticket, and job tables.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use seatbatch_core::{
    Config, ConcertCatalog, DatabaseConfig, EngineConfig, JobOrchestrator, JobStore,
    RetryConfig, SqliteConcertCatalog, SqliteJobStore, SqliteTicketSink, TicketRepository,
    TicketSink,
};

/// Re-export fixtures for test convenience
pub use seatbatch_core::testing::fixtures;

/// Test fixture for API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_launch() {
///     let fixture = TestFixture::new().await;
///     fixture.seed_concert(42, 100);
///
///     let response = fixture.post("/api/v1/jobs?wait=true", json!({
///         "strategy": "sequential",
///         "concert_id": 42,
///         "run_key": "r1"
///     })).await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Orchestrator behind the router
    pub orchestrator: Arc<JobOrchestrator>,
    /// Catalog tables, for seeding without going through the API
    pub catalog: Arc<SqliteConcertCatalog>,
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
    /// Create a new test fixture with small chunks and fast retries.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            engine: EngineConfig::default()
                .with_chunk_size(10)
                .with_retry(RetryConfig::default().with_delays(1, 5)),
            ..Config::default()
        };

        // Create stores
        let catalog = Arc::new(
            SqliteConcertCatalog::new(&db_path).expect("Failed to create catalog"),
        );
        let tickets = Arc::new(
            SqliteTicketSink::new(&db_path).expect("Failed to create ticket sink"),
        );
        let jobs = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));

        let orchestrator = Arc::new(JobOrchestrator::new(
            config.engine.clone(),
            Arc::clone(&catalog) as Arc<dyn ConcertCatalog>,
            Arc::clone(&tickets) as Arc<dyn TicketSink>,
            jobs as Arc<dyn JobStore>,
        ));

        let state = Arc::new(seatbatch_server::state::AppState::new(
            config,
            Arc::clone(&orchestrator),
            Arc::clone(&catalog),
            tickets as Arc<dyn TicketRepository>,
        ));

        // Create router
        let router = seatbatch_server::api::create_router(state);

        Self {
            router,
            orchestrator,
            catalog,
            temp_dir,
        }
    }

    /// Seed a concert with the standard three-tier layout.
    pub fn seed_concert(&self, concert_id: i64, ticket_amount: u64) {
        self.catalog
            .upsert_concert(
                &format!("Concert {}", concert_id),
                &fixtures::concert_snapshot(concert_id, ticket_amount),
            )
            .expect("Failed to seed concert");
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

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

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

        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

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

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
