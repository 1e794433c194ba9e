//! HTTP API over a faked service.

mod common;

use std::sync::Arc;

use common::*;
use finsight::server::router;
use serde_json::{json, Value};

async fn spawn(h: Harness) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(h.service));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn empty_harness() -> Harness {
    harness(
        config_with(&[], &[]),
        FakeDirectory::new(),
        FakeNews::new(),
        FakeTranscriber::new(),
        KeywordEmbedder::new(),
    )
}

#[tokio::test]
async fn health_reports_version() {
    let base = spawn(empty_harness()).await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn podcast_query_returns_documents() {
    let directory = FakeDirectory::new().show("Show", vec![episode("Apple earnings", "https://cdn/a.mp3")]);
    let h = harness(
        config_with(&["Show"], &[]),
        directory,
        FakeNews::new(),
        FakeTranscriber::new().text("https://cdn/a.mp3", "Apple beat estimates."),
        KeywordEmbedder::new(),
    );
    let base = spawn(h).await;
    let client = reqwest::Client::new();

    let indexing: Value = client
        .post(format!("{}/api/indexing", base))
        .json(&json!({ "scope": "podcasts" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(indexing["success"], true);

    let resp = client
        .post(format!("{}/api/query", base))
        .json(&json!({ "query": "Apple" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let docs = body["podcastDocuments"].as_array().unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0]["title"], "Apple earnings");
}

#[tokio::test]
async fn blank_query_is_a_bad_request() {
    let base = spawn(empty_harness()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/query", base))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let base = spawn(empty_harness()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/news", base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn news_without_tickers_is_unprocessable() {
    let base = spawn(empty_harness()).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/api/news", base))
        .json(&json!({ "query": "weather in Paris" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "no_tickers");
}

#[tokio::test]
async fn chart_symbols_endpoint() {
    let base = spawn(empty_harness()).await;
    let body: Value = reqwest::Client::new()
        .post(format!("{}/api/chart-symbols", base))
        .json(&json!({ "query": "apple" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["stockSymbols"], json!([["NASDAQ:AAPL"]]));
}

#[tokio::test]
async fn indexing_rejects_unknown_scope_and_accepts_empty_body() {
    let base = spawn(empty_harness()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/indexing", base))
        .json(&json!({ "scope": "videos" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/indexing", base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Indexing completed: 0 documents stored from 0 sources (0 failed)"
    );
}
