use crate::app::build_http_app;
use crate::backup::BackupManager;
use crate::config::ServerConfig;
use crate::service::MetricService;
use crate::state::AppState;
use anyhow::{anyhow, Context, Result};
use gaugemon_storage::open_store;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Everything a running server owns.
pub struct Server {
    pub state: AppState,
    pub backup: Arc<BackupManager>,
}

impl Server {
    /// Opens the store, restores the backup when enabled and builds the
    /// request state. Nothing listens yet.
    pub async fn prepare(config: &ServerConfig) -> Result<Self> {
        let store = open_store(config.database_dsn.as_deref())
            .await
            .context("Failed to open metric store")?;
        let service = Arc::new(MetricService::new(store));
        let backup = Arc::new(BackupManager::new(
            service.clone(),
            &config.file_storage_path,
            config.store_interval(),
        ));

        if config.restore {
            backup
                .restore()
                .await
                .with_context(|| {
                    format!("Failed to restore metrics from {}", config.file_storage_path)
                })?;
        }

        let state = AppState::new(service, config.key.as_deref())?;
        Ok(Self { state, backup })
    }

    /// Serves on `listener` until `shutdown` fires or the backup loop
    /// fails, then writes a final backup and closes the store.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let mut backup_errors = self
            .backup
            .notify()
            .ok_or_else(|| anyhow!("backup error channel already taken"))?;
        let backup_task = self.backup.start(shutdown.clone());

        let app = build_http_app(self.state.clone());
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            signed = self.state.hasher.is_some(),
            "HTTP server listening"
        );

        let graceful = {
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        };
        let http = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(graceful);

        let outcome = tokio::select! {
            result = http => result.context("HTTP server error"),
            Some(err) = backup_errors.recv() => {
                Err(anyhow::Error::new(err).context("Backup loop failed"))
            }
        };

        shutdown.cancel();
        if let Err(e) = backup_task.await {
            tracing::warn!(error = %e, "Backup task ended abnormally");
        }

        match self.backup.dump_now().await {
            Ok(()) => tracing::info!(path = %self.backup.path().display(), "Final backup written"),
            Err(e) => tracing::error!(error = %e, "Final backup failed"),
        }
        if let Err(e) = self.state.service.close().await {
            tracing::warn!(error = %e, "Failed to close metric store");
        }
        tracing::info!("Server stopped");
        outcome
    }
}

/// Startup in order: store, restore, bind, serve.
pub async fn run(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let server = Server::prepare(&config).await?;
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    server.serve(listener, shutdown).await
}
