//! Latest-value storage for gauges and counters.
//!
//! [`MetricStore`] is the capability the server writes through. Two backends
//! implement it: [`memory::MemStore`] (the default, process-local) and
//! [`sql::SqlStore`] (any database `sea-orm` can reach, selected by passing a
//! DSN to [`open_store`]).

pub mod error;
pub mod memory;
pub mod sql;


use async_trait::async_trait;
use gaugemon_common::types::{CounterMetric, GaugeMetric};
use std::sync::Arc;

pub use error::{Result, StorageError};
pub use memory::MemStore;
pub use sql::SqlStore;

/// Persistence backend for the latest value of every metric.
///
/// Gauges and counters live in separate namespaces. A gauge write replaces
/// the stored value; a counter write adds its delta to the stored total.
///
/// Implementations must be `Send + Sync`: request handlers and the backup
/// loop call into the same instance concurrently.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn write_gauge(&self, name: &str, value: f64) -> Result<()>;

    async fn write_counter(&self, name: &str, delta: i64) -> Result<()>;

    /// Fails with [`StorageError::NotFound`] if `name` was never written.
    async fn read_gauge(&self, name: &str) -> Result<f64>;

    /// Fails with [`StorageError::NotFound`] if `name` was never written.
    async fn read_counter(&self, name: &str) -> Result<i64>;

    /// All gauges, sorted by name.
    async fn read_all_gauges(&self) -> Result<Vec<GaugeMetric>>;

    /// All counters, sorted by name.
    async fn read_all_counters(&self) -> Result<Vec<CounterMetric>>;

    /// Upserts every entry with the same semantics as the single writes.
    ///
    /// Counter entries are applied in order, so a repeated name adds twice.
    /// The SQL backend applies the whole batch in one transaction.
    async fn write_batch(&self, gauges: &[GaugeMetric], counters: &[CounterMetric]) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Opens the backend selected by `dsn`: none (or blank) picks the in-memory
/// store, anything else is handed to [`SqlStore::connect`].
pub async fn open_store(dsn: Option<&str>) -> Result<Arc<dyn MetricStore>> {
    match dsn.map(str::trim).filter(|d| !d.is_empty()) {
        Some(dsn) => Ok(Arc::new(SqlStore::connect(dsn).await?)),
        None => {
            tracing::info!("No database DSN configured, using in-memory store");
            Ok(Arc::new(MemStore::new()))
        }
    }
}
