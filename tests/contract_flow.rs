//! End-to-end contract flow: a consumer exercising the mock provider, then
//! the same contract verified against real butter providers.

use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use contract_mock_server::{
    HttpProvider, Interaction, MockServer, MockServiceConfig, Pattern, ServiceSettings, Verifier,
};
use serde_json::{json, Value};

fn butter_contract() -> MockServiceConfig {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/default-config.yaml");
    MockServiceConfig::from_file(std::path::Path::new(path)).unwrap()
}

fn mock_with_contract() -> MockServer {
    let server = MockServer::start(&ServiceSettings::ephemeral()).unwrap();
    for interaction in butter_contract().interactions {
        server.register(interaction).unwrap();
    }
    server
}

async fn spawn_provider(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Butters anything, but never twice.
fn careful_butterer() -> Router {
    async fn butter(Path(substrate): Path<String>) -> String {
        if substrate.ends_with("butter") {
            substrate
        } else {
            format!("{} and butter", substrate)
        }
    }
    async fn info() -> Json<Value> {
        Json(json!({"salt": "1.5%", "lactose": false}))
    }
    Router::new()
        .route("/butter/{substrate}", get(butter))
        .route("/info", get(info))
}

/// Butters everything it is given and knows nothing about its butter.
fn naive_butterer() -> Router {
    async fn butter(Path(substrate): Path<String>) -> String {
        format!("{} and butter", substrate)
    }
    Router::new().route("/butter/{substrate}", get(butter))
}

#[tokio::test]
async fn test_consumer_against_mock() {
    let server = mock_with_contract();

    let result = reqwest::get(server.url("/butter/bread")).await.unwrap();
    assert_eq!(result.status().as_u16(), 200);
    assert_eq!(result.text().await.unwrap(), "bread and butter");

    let result = reqwest::get(server.url("/butter/bread%20and%20butter")).await.unwrap();
    assert_eq!(result.status().as_u16(), 200);
    assert_eq!(result.text().await.unwrap(), "bread and butter");

    let result = reqwest::get(server.url("/info")).await.unwrap();
    let info: Value = serde_json::from_str(&result.text().await.unwrap()).unwrap();
    assert!(info["lactose"].is_boolean());
    let salt = info["salt"].as_str().unwrap();
    assert!(salt.ends_with('%'));
    assert!(salt.trim_end_matches('%').parse::<f64>().unwrap() >= 0.0);

    let report = server.invocation_report();
    assert!(report.is_satisfied(), "{}", report);
}

#[tokio::test]
async fn test_override_and_clear_between_scenarios() {
    let server = mock_with_contract();

    let toast = Interaction::builder()
        .given("We want to butter toast")
        .upon_receiving("a request to butter bread, answered with toast")
        .with_request("get", "/butter/bread")
        .will_respond_with(200, Some(Pattern::literal("toast and butter")));
    let handle = server.register(toast).unwrap();

    let result = reqwest::get(server.url("/butter/bread")).await.unwrap();
    assert_eq!(result.text().await.unwrap(), "toast and butter");
    assert_eq!(server.times_received(handle), 1);
    assert_eq!(server.interactions().len(), 3);

    server.clear();
    let result = reqwest::get(server.url("/butter/bread")).await.unwrap();
    assert_eq!(result.status().as_u16(), 500);
    assert_eq!(server.invocation_report().unexpected.len(), 1);
}

#[tokio::test]
async fn test_careful_provider_honours_contract() {
    let base_url = spawn_provider(careful_butterer()).await;
    let contract = butter_contract();

    let report = Verifier::new(HttpProvider::new(base_url))
        .verify_all(&contract.interactions)
        .await;

    assert!(report.is_verified(), "{}", report);
    assert_eq!(report.results.len(), 3);
}

#[tokio::test]
async fn test_naive_provider_breaks_contract() {
    let base_url = spawn_provider(naive_butterer()).await;
    let contract = butter_contract();

    let report = Verifier::new(HttpProvider::new(base_url))
        .verify_all(&contract.interactions)
        .await;

    assert!(!report.is_verified());
    let failed: Vec<&str> = report.failures().map(|f| f.description.as_str()).collect();
    assert_eq!(
        failed,
        vec!["a request to butter buttered bread", "a request for information"]
    );

    let twice = &report.results[1].result;
    assert_eq!(twice.mismatches().len(), 1);
    assert_eq!(twice.mismatches()[0].path, "$.body");
    assert_eq!(twice.mismatches()[0].actual, json!("bread and butter and butter"));

    let info = &report.results[2].result;
    assert!(info.mismatches().iter().any(|m| m.path == "$.status"));
}

#[tokio::test]
async fn test_unreachable_provider() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let report = Verifier::new(HttpProvider::new(base_url))
        .verify_all(&butter_contract().interactions)
        .await;

    assert_eq!(report.failures().count(), 3);
    assert!(report
        .results
        .iter()
        .all(|r| r.result.mismatches()[0].path == "$transport"));
}
