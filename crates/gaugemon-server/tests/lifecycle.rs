use gaugemon_agent::{Transport, TransportError};
use gaugemon_common::retry::RetrySchedule;
use gaugemon_common::types::{BackupImage, CounterMetric, GaugeMetric, MetricRecord};
use gaugemon_server::config::ServerConfig;
use gaugemon_server::server::Server;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

fn config(backup: &Path, key: Option<&str>) -> ServerConfig {
    ServerConfig {
        address: "127.0.0.1:0".to_string(),
        store_interval_secs: 3600,
        file_storage_path: backup.to_string_lossy().to_string(),
        restore: true,
        key: key.map(str::to_string),
        ..ServerConfig::default()
    }
}

async fn start(
    config: &ServerConfig,
) -> (SocketAddr, CancellationToken, JoinHandle<anyhow::Result<()>>) {
    let server = Server::prepare(config).await.unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.serve(listener, shutdown.clone()));
    (addr, shutdown, handle)
}

fn transport(addr: SocketAddr, key: Option<&str>) -> Transport {
    Transport::new(&addr.to_string(), key)
        .unwrap()
        .with_retry(RetrySchedule::none())
}

fn gauge(name: &str, value: f64) -> GaugeMetric {
    GaugeMetric {
        name: name.to_string(),
        value,
    }
}

fn counter(name: &str, value: i64) -> CounterMetric {
    CounterMetric {
        name: name.to_string(),
        value,
    }
}

fn read_backup(path: &Path) -> BackupImage {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn restores_at_startup_and_dumps_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let backup = dir.path().join("metrics.json");
    std::fs::write(
        &backup,
        r#"{"gauges":[{"name":"g","value":1.5}],"counters":[{"name":"c","value":4}]}"#,
    )
    .unwrap();

    let (addr, shutdown, handle) = start(&config(&backup, None)).await;
    transport(addr, None)
        .deliver(&[
            MetricRecord::counter("c", 1),
            MetricRecord::gauge("h", 2.0),
        ])
        .await
        .unwrap();

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let image = read_backup(&backup);
    assert_eq!(
        image.gauges,
        vec![gauge("g", 1.5), gauge("h", 2.0)]
    );
    assert_eq!(image.counters, vec![counter("c", 5)]);
}

#[tokio::test]
async fn startup_fails_on_corrupt_backup() {
    let dir = TempDir::new().unwrap();
    let backup = dir.path().join("metrics.json");
    std::fs::write(&backup, "[1, 2").unwrap();
    assert!(Server::prepare(&config(&backup, None)).await.is_err());
}

#[tokio::test]
async fn agent_transport_signs_batches_the_server_accepts() {
    let dir = TempDir::new().unwrap();
    let backup = dir.path().join("metrics.json");
    let (addr, shutdown, handle) = start(&config(&backup, Some("shared-key"))).await;

    transport(addr, Some("shared-key"))
        .deliver(&[MetricRecord::counter("PollCount", 3)])
        .await
        .unwrap();

    match transport(addr, Some("other-key"))
        .deliver(&[MetricRecord::counter("PollCount", 3)])
        .await
    {
        Err(TransportError::Status { status, .. }) => assert_eq!(status.as_u16(), 400),
        other => panic!("expected 400, got {other:?}"),
    }

    shutdown.cancel();
    handle.await.unwrap().unwrap();

    let image = read_backup(&backup);
    assert_eq!(image.counters, vec![counter("PollCount", 3)]);
}
