use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use jobpipe_api::app::{build_app, services::build_services, AppServices};
use jobpipe_infra::config::AppConfig;
use jobpipe_infra::jobs::{InMemoryJobStore, WorkerHandle};
use jobpipe_infra::queue::InMemoryJobQueue;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    _workers: Option<WorkerHandle>,
}

impl TestServer {
    /// Same wiring as prod in in-memory mode (workers included), bound to an
    /// ephemeral port.
    async fn spawn() -> Self {
        let config = AppConfig::from_lookup(|key| match key {
            "WORKER_BLOCK_MS" => Some("20".to_string()),
            "WORKER_CONCURRENCY" => Some("2".to_string()),
            _ => None,
        })
        .expect("default config");
        let runtime = build_services(&config).await.expect("in-memory services");
        Self::serve(build_app(runtime.services), runtime.workers).await
    }

    /// Services without any worker, so jobs stay `received`.
    async fn spawn_with(services: AppServices) -> Self {
        Self::serve(build_app(Arc::new(services)), None).await
    }

    async fn serve(app: axum::Router, workers: Option<WorkerHandle>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            _workers: workers,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn submit(client: &reqwest::Client, srv: &TestServer, body: serde_json::Value) -> i64 {
    let res = client
        .post(srv.url("/calculate"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "received");
    body["id"].as_i64().expect("numeric id")
}

async fn result_eventually(
    client: &reqwest::Client,
    srv: &TestServer,
    id: i64,
) -> serde_json::Value {
    // Workers run asynchronously; poll until the job is terminal.
    for _ in 0..200 {
        let res = client
            .get(srv.url(&format!("/result/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = res.json().await.unwrap();
        if body["status"] != "received" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("job {id} did not complete within timeout");
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn ready_when_backends_answer() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/ready")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn not_ready_when_queue_is_closed() {
    let queue = Arc::new(InMemoryJobQueue::new());
    queue.close();
    let srv = TestServer::spawn_with(AppServices::new(InMemoryJobStore::arc(), queue)).await;

    let res = reqwest::get(srv.url("/ready")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_ready");

    // Liveness does not depend on the backends.
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn add_completes_with_fixed_point_result() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, json!({"operation": "add", "data": ["2", "3"]})).await;
    let body = result_eventually(&client, &srv, id).await;

    assert_eq!(body["id"], id);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"], "5.000000");
}

#[tokio::test]
async fn factorial_and_fibonacci_results() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let factorial = submit(&client, &srv, json!({"operation": "factorial", "data": ["20"]})).await;
    let fibonacci = submit(&client, &srv, json!({"operation": "fibonacci", "data": [10]})).await;

    let body = result_eventually(&client, &srv, factorial).await;
    assert_eq!(body["result"], "2432902008176640000");
    let body = result_eventually(&client, &srv, fibonacci).await;
    assert_eq!(body["result"], "55");
}

#[tokio::test]
async fn division_by_zero_is_a_failed_job() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, json!({"operation": "divide", "data": ["5", "0"]})).await;
    let body = result_eventually(&client, &srv, id).await;

    assert_eq!(body["status"], "failed");
    assert!(body["result"].as_str().unwrap().starts_with("error: "));
}

#[tokio::test]
async fn completed_results_are_stable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, json!({"operation": "multiply", "data": ["6", "7"]})).await;
    let first = result_eventually(&client, &srv, id).await;

    for _ in 0..3 {
        let again: serde_json::Value = client
            .get(srv.url(&format!("/result/{id}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn malformed_submissions_are_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/calculate"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client
        .post(srv.url("/calculate"))
        .json(&json!({"data": ["1"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_and_invalid_ids() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/result/999999")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    for id in ["0", "-3", "9223372036854775808"] {
        let res = client
            .get(srv.url(&format!("/result/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "id {id}");
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "not_found");
    }

    let res = client.get(srv.url("/result/abc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn jobs_without_workers_stay_received() {
    let store = InMemoryJobStore::arc();
    let queue = Arc::new(InMemoryJobQueue::new());
    let srv = TestServer::spawn_with(AppServices::new(store, queue.clone())).await;
    let client = reqwest::Client::new();

    let id = submit(&client, &srv, json!({"operation": "add", "data": ["1", "2"]})).await;

    let body: serde_json::Value = client
        .get(srv.url(&format!("/result/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "received");
    assert_eq!(body["result"], "");
    assert_eq!(queue.ready_len(), 1);
}

#[tokio::test]
async fn publish_failure_is_a_server_error_and_leaves_no_job() {
    let store = InMemoryJobStore::arc();
    let queue = Arc::new(InMemoryJobQueue::new());
    queue.close();
    let srv = TestServer::spawn_with(AppServices::new(store.clone(), queue)).await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/calculate"))
        .json(&json!({"operation": "add", "data": ["1", "2"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "transport_error");

    assert!(store.is_empty());
    let res = client.get(srv.url("/result/1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
