use anyhow::Result;
use gaugemon_common::shutdown::shutdown_signal;
use gaugemon_server::config::ServerConfig;
use gaugemon_server::server;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = ServerConfig::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(config.log_directive().parse()?),
        )
        .init();

    tracing::info!(
        address = %config.listen_addr(),
        store_interval_secs = config.store_interval_secs,
        file_storage_path = %config.file_storage_path,
        restore = config.restore,
        database = config.database_dsn.is_some(),
        signing = config.key.is_some(),
        "gaugemon-server starting"
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    server::run(config, shutdown).await
}
