#![allow(dead_code)]

use anyhow::Result;
use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use flate2::write::GzEncoder;
use flate2::Compression;
use gaugemon_server::app;
use gaugemon_server::service::MetricService;
use gaugemon_server::state::AppState;
use gaugemon_storage::memory::MemStore;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tower::util::ServiceExt;

pub struct TestContext {
    pub state: AppState,
    pub app: axum::Router,
}

pub fn build_test_context(key: Option<&str>) -> Result<TestContext> {
    let service = Arc::new(MetricService::new(Arc::new(MemStore::new())));
    let state = AppState::new(service, key)?;
    let app = app::build_http_app(state.clone());
    Ok(TestContext { state, app })
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("body should be JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Body>,
) -> TestResponse {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(body.into()).expect("request should build");

    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should be handled");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("body should read");
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn post_json(app: &axum::Router, uri: &str, body: Value) -> TestResponse {
    send(
        app,
        "POST",
        uri,
        &[("Content-Type", "application/json")],
        body.to_string(),
    )
    .await
}

pub async fn get(app: &axum::Router, uri: &str) -> TestResponse {
    send(app, "GET", uri, &[], Body::empty()).await
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}
