//! Black-box tests against the in-memory app: same router as prod, real HTTP
//! over an ephemeral port, with the in-process worker draining the queue.

use reqwest::StatusCode;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let app = climrisk_api::app::build_in_memory_app();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Poll a run until it leaves the queued/running states. The worker picks
/// jobs up asynchronously, so completion is eventual.
async fn get_run_eventually(
    client: &reqwest::Client,
    base_url: &str,
    run_id: &str,
) -> serde_json::Value {
    for _ in 0..100 {
        let res = client
            .get(format!("{}/v1/runs/{}", base_url, run_id))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body: serde_json::Value = res.json().await.unwrap();
        let status = body["status"].as_str().unwrap().to_string();
        if status != "queued" && status != "running" {
            return body;
        }

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    panic!("run did not reach a terminal status within timeout");
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn run_lifecycle_create_complete_evidence() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/v1/runs", srv.base_url))
        .json(&json!({
            "name": "pilot",
            "parameters": {"region": "apac"}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "queued");
    let run_id = body["run_id"].as_str().unwrap().to_string();
    assert!(run_id.starts_with("run_"));

    let run = get_run_eventually(&client, &srv.base_url, &run_id).await;
    assert_eq!(run["status"], "done");
    assert_eq!(run["parameters"]["name"], "pilot");
    assert_eq!(run["parameters"]["region"], "apac");
    assert!(run["error"].is_null());

    let res = client
        .get(format!(
            "{}/v1/evidence?run_id={}",
            srv.base_url, run_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["type"], "analysis_summary");
    assert_eq!(items[0]["run_id"], run_id);
}

#[tokio::test]
async fn name_only_create_still_records_name_in_parameters() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // No `parameters` in the body at all; the name must still land in the
    // stored parameters document.
    let res = client
        .post(format!("{}/v1/runs", srv.base_url))
        .json(&json!({"name": "pilot"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    let body: serde_json::Value = res.json().await.unwrap();
    let run_id = body["run_id"].as_str().unwrap().to_string();

    let res = client
        .get(format!("{}/v1/runs/{}", srv.base_url, run_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let run: serde_json::Value = res.json().await.unwrap();
    assert!(run["parameters"].is_object());
    assert_eq!(run["parameters"]["name"], "pilot");
}

#[tokio::test]
async fn unknown_run_is_404() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/v1/runs/run_0000000000000000", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // A malformed id is also reported as not found, not a server error.
    let res = client
        .get(format!("{}/v1/runs/not-a-run-id", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn runs_are_tenant_scoped() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/v1/runs", srv.base_url))
        .json(&json!({"tenant_id": "acme", "parameters": {}}))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    let run_id = body["run_id"].as_str().unwrap().to_string();

    // Visible under its own tenant.
    let res = client
        .get(format!(
            "{}/v1/runs/{}?tenant_id=acme",
            srv.base_url, run_id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Invisible under the default tenant.
    let res = client
        .get(format!("{}/v1/runs/{}", srv.base_url, run_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn asset_bulk_upsert_reports_count() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/v1/assets/bulk_upsert", srv.base_url))
        .json(&json!({
            "assets": [
                {"external_id": "site-1", "name": "Harbour depot", "lat": -36.84, "lon": 174.76},
                {"external_id": "site-2", "name": "Inland warehouse"}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["upserted"], 2);

    // Upserting the same external ids again is idempotent at the count level.
    let res = client
        .post(format!("{}/v1/assets/bulk_upsert", srv.base_url))
        .json(&json!({
            "assets": [{"external_id": "site-1", "name": "Harbour depot (renamed)"}]
        }))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["upserted"], 1);
}
