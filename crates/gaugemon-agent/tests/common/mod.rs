use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use flate2::read::GzDecoder;
use gaugemon_common::types::MetricRecord;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// One request as seen by the fake collector endpoint.
#[derive(Debug, Clone)]
pub struct Received {
    pub at: Instant,
    pub headers: HeaderMap,
    pub raw: Vec<u8>,
    pub records: Vec<MetricRecord>,
}

#[derive(Clone, Default)]
pub struct Recorder {
    script: Arc<Mutex<Vec<u16>>>,
    received: Arc<Mutex<Vec<Received>>>,
    delay: Duration,
}

impl Recorder {
    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }
}

async fn updates(State(rec): State<Recorder>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let mut json = String::new();
    GzDecoder::new(body.as_ref()).read_to_string(&mut json).unwrap();
    let records: Vec<MetricRecord> = serde_json::from_str(&json).unwrap();
    rec.received.lock().unwrap().push(Received {
        at: Instant::now(),
        headers,
        raw: body.to_vec(),
        records,
    });
    tokio::time::sleep(rec.delay).await;

    let mut script = rec.script.lock().unwrap();
    let code = if script.is_empty() { 200 } else { script.remove(0) };
    StatusCode::from_u16(code).unwrap()
}

/// Starts a `/updates/` endpoint on an ephemeral port that answers with the
/// scripted statuses in order, then 200 forever.
pub async fn spawn_server(script: &[u16]) -> (SocketAddr, Recorder) {
    spawn_slow_server(script, Duration::ZERO).await
}

/// Like [`spawn_server`], but every response is held back for `delay`.
#[allow(dead_code)]
pub async fn spawn_slow_server(script: &[u16], delay: Duration) -> (SocketAddr, Recorder) {
    let recorder = Recorder {
        script: Arc::new(Mutex::new(script.to_vec())),
        received: Arc::default(),
        delay,
    };
    let app = Router::new()
        .route("/updates/", post(updates))
        .with_state(recorder.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, recorder)
}
