use crate::service::{MetricService, ServiceError};
use gaugemon_common::types::BackupImage;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("backup file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("backup file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Periodic JSON snapshot of the store, plus restore at startup.
pub struct BackupManager {
    service: Arc<MetricService>,
    path: PathBuf,
    interval: Duration,
    errors_tx: mpsc::Sender<BackupError>,
    errors_rx: Mutex<Option<mpsc::Receiver<BackupError>>>,
}

impl BackupManager {
    pub fn new(service: Arc<MetricService>, path: impl Into<PathBuf>, interval: Duration) -> Self {
        let (errors_tx, errors_rx) = mpsc::channel(1);
        Self {
            service,
            path: path.into(),
            interval,
            errors_tx,
            errors_rx: Mutex::new(Some(errors_rx)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hands out the receiver of the first loop failure. Only the first
    /// call gets it.
    pub fn notify(&self) -> Option<mpsc::Receiver<BackupError>> {
        self.errors_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Dumps every `interval` until `shutdown` fires or a dump fails. The
    /// failure is sent on the notify channel and ends the loop.
    pub fn start(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut tick = interval_at(Instant::now() + manager.interval, manager.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => {}
                }
                if let Err(e) = manager.dump_now().await {
                    tracing::error!(
                        path = %manager.path.display(),
                        error = %e,
                        "Backup failed, stopping backup loop"
                    );
                    if let Err(e) = manager.errors_tx.try_send(e) {
                        tracing::warn!(error = %e, "Backup failure not delivered to supervisor");
                    }
                    break;
                }
            }
            tracing::debug!("Backup loop stopped");
        })
    }

    /// Writes the whole store to the backup file.
    ///
    /// The image goes to a sibling `.tmp` file first and is renamed over the
    /// target, so a crash never leaves a half-written backup.
    pub async fn dump_now(&self) -> Result<(), BackupError> {
        let image = BackupImage {
            gauges: self.service.get_all_gauges().await?,
            counters: self.service.get_all_counters().await?,
        };
        let data = serde_json::to_vec(&image)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path(&self.path);
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            gauges = image.gauges.len(),
            counters = image.counters.len(),
            "Backup written"
        );
        Ok(())
    }

    /// Replays the backup file into the store: gauges are set, counter
    /// totals are added. A missing or empty file restores nothing.
    ///
    /// Returns the number of metrics restored.
    pub async fn restore(&self) -> Result<usize, BackupError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No backup file, nothing to restore");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            tracing::info!(path = %self.path.display(), "Backup file is empty, nothing to restore");
            return Ok(0);
        }

        let image: BackupImage = serde_json::from_slice(&data)?;
        for g in &image.gauges {
            self.service.push_gauge(&g.name, g.value).await?;
        }
        for c in &image.counters {
            self.service.push_counter(&c.name, c.value).await?;
        }

        let restored = image.gauges.len() + image.counters.len();
        tracing::info!(
            path = %self.path.display(),
            gauges = image.gauges.len(),
            counters = image.counters.len(),
            "Restored metrics from backup"
        );
        Ok(restored)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaugemon_storage::memory::MemStore;
    use tempfile::TempDir;

    fn manager(path: PathBuf, interval: Duration) -> Arc<BackupManager> {
        let service = Arc::new(MetricService::new(Arc::new(MemStore::new())));
        Arc::new(BackupManager::new(service, path, interval))
    }

    #[tokio::test]
    async fn test_dump_and_restore_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("metrics.json");

        let source = manager(path.clone(), Duration::from_secs(60));
        source.service.push_gauge("g", 1.5).await.unwrap();
        source.service.push_counter("c", 4).await.unwrap();
        source.dump_now().await.unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({
                "gauges": [{"name": "g", "value": 1.5}],
                "counters": [{"name": "c", "value": 4}],
            })
        );
        assert!(!tmp_path(&path).exists());

        let target = manager(path, Duration::from_secs(60));
        target.service.push_counter("c", 1).await.unwrap();
        assert_eq!(target.restore().await.unwrap(), 2);
        assert_eq!(target.service.get_gauge("g").await.unwrap(), 1.5);
        // Counter totals are added to what the store already holds
        assert_eq!(target.service.get_counter("c").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_restore_tolerates_missing_and_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");

        let m = manager(path.clone(), Duration::from_secs(60));
        assert_eq!(m.restore().await.unwrap(), 0);

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(m.restore().await.unwrap(), 0);

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(m.restore().await, Err(BackupError::Json(_))));
    }

    #[tokio::test]
    async fn test_loop_writes_periodically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        let m = manager(path.clone(), Duration::from_millis(20));
        m.service.push_counter("c", 1).await.unwrap();

        let shutdown = CancellationToken::new();
        let handle = m.start(shutdown.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(path.exists());
        assert!(m.notify().unwrap().try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_gauge_keeps_backup_restorable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");

        let source = manager(path.clone(), Duration::from_secs(60));
        assert!(source.service.push_raw("gauge", "bad", "NaN").await.is_err());
        source.service.push_gauge("good", 0.5).await.unwrap();
        source.dump_now().await.unwrap();

        let target = manager(path, Duration::from_secs(60));
        assert_eq!(target.restore().await.unwrap(), 1);
        assert_eq!(target.service.get_gauge("good").await.unwrap(), 0.5);
    }

    #[tokio::test]
    async fn test_failure_with_dropped_receiver_still_stops_loop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let m = manager(path, Duration::from_millis(10));
        drop(m.notify());
        let handle = m.start(CancellationToken::new());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_reports_first_failure_and_stops() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail
        let path = dir.path().join("metrics.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        let m = manager(path, Duration::from_millis(10));
        let mut errors = m.notify().unwrap();
        assert!(m.notify().is_none());

        let handle = m.start(CancellationToken::new());
        let err = tokio::time::timeout(Duration::from_secs(5), errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, BackupError::Io(_)));
        // The loop exits on its own after reporting
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
