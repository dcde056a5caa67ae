use gaugemon_common::types::{CounterMetric, GaugeMetric, MetricKind, MetricRecord, UnknownKind};
use gaugemon_storage::{MetricStore, StorageError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidType(#[from] UnknownKind),
    #[error("metric '{name}' of type {kind} is missing its {field}")]
    MissingValue {
        kind: MetricKind,
        name: String,
        field: &'static str,
    },
    #[error("invalid {kind} value '{raw}'")]
    InvalidValue { kind: MetricKind, raw: String },
    #[error("metric name must not be empty")]
    EmptyName,
    #[error("{kind} metric '{name}' not found")]
    NotFound { kind: MetricKind, name: String },
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, name } => ServiceError::NotFound { kind, name },
            other => ServiceError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Validation and aggregation on top of a [`MetricStore`].
pub struct MetricService {
    store: Arc<dyn MetricStore>,
}

impl MetricService {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    pub async fn push_gauge(&self, name: &str, value: f64) -> Result<()> {
        check_name(name)?;
        check_finite(value)?;
        self.store.write_gauge(name, value).await?;
        Ok(())
    }

    pub async fn push_counter(&self, name: &str, delta: i64) -> Result<()> {
        check_name(name)?;
        self.store.write_counter(name, delta).await?;
        Ok(())
    }

    /// Update from the path form `/update/{type}/{name}/{value}`.
    pub async fn push_raw(&self, mtype: &str, name: &str, raw: &str) -> Result<()> {
        match mtype.parse::<MetricKind>()? {
            MetricKind::Gauge => {
                let value = raw.parse::<f64>().map_err(|_| invalid(MetricKind::Gauge, raw))?;
                self.push_gauge(name, value).await
            }
            MetricKind::Counter => {
                let delta = raw.parse::<i64>().map_err(|_| invalid(MetricKind::Counter, raw))?;
                self.push_counter(name, delta).await
            }
        }
    }

    pub async fn push(&self, record: &MetricRecord) -> Result<()> {
        match validate(record)? {
            Validated::Gauge(value) => self.push_gauge(&record.id, value).await,
            Validated::Counter(delta) => self.push_counter(&record.id, delta).await,
        }
    }

    /// Validates every record, then applies the batch atomically.
    ///
    /// Duplicate gauges keep the last value; duplicate counters are summed
    /// before reaching the store.
    pub async fn push_batch(&self, records: &[MetricRecord]) -> Result<()> {
        let mut gauges: Vec<GaugeMetric> = Vec::new();
        let mut gauge_index: HashMap<&str, usize> = HashMap::new();
        let mut counters: Vec<CounterMetric> = Vec::new();
        let mut counter_index: HashMap<&str, usize> = HashMap::new();

        for record in records {
            match validate(record)? {
                Validated::Gauge(value) => match gauge_index.get(record.id.as_str()) {
                    Some(&i) => gauges[i].value = value,
                    None => {
                        gauge_index.insert(&record.id, gauges.len());
                        gauges.push(GaugeMetric {
                            name: record.id.clone(),
                            value,
                        });
                    }
                },
                Validated::Counter(delta) => match counter_index.get(record.id.as_str()) {
                    Some(&i) => counters[i].value = counters[i].value.wrapping_add(delta),
                    None => {
                        counter_index.insert(&record.id, counters.len());
                        counters.push(CounterMetric {
                            name: record.id.clone(),
                            value: delta,
                        });
                    }
                },
            }
        }

        self.store.write_batch(&gauges, &counters).await?;
        Ok(())
    }

    pub async fn get_gauge(&self, name: &str) -> Result<f64> {
        Ok(self.store.read_gauge(name).await?)
    }

    pub async fn get_counter(&self, name: &str) -> Result<i64> {
        Ok(self.store.read_counter(name).await?)
    }

    /// Current value in its plain-text form: the shortest decimal for a
    /// gauge, an integer for a counter.
    pub async fn get_raw(&self, mtype: &str, name: &str) -> Result<String> {
        match mtype.parse::<MetricKind>()? {
            MetricKind::Gauge => Ok(self.get_gauge(name).await?.to_string()),
            MetricKind::Counter => Ok(self.get_counter(name).await?.to_string()),
        }
    }

    /// Fills in `value` or `delta` of a `{id, type}` query record.
    pub async fn lookup(&self, mut record: MetricRecord) -> Result<MetricRecord> {
        match record.kind()? {
            MetricKind::Gauge => {
                record.value = Some(self.get_gauge(&record.id).await?);
                record.delta = None;
            }
            MetricKind::Counter => {
                record.delta = Some(self.get_counter(&record.id).await?);
                record.value = None;
            }
        }
        Ok(record)
    }

    pub async fn get_all_gauges(&self) -> Result<Vec<GaugeMetric>> {
        Ok(self.store.read_all_gauges().await?)
    }

    pub async fn get_all_counters(&self) -> Result<Vec<CounterMetric>> {
        Ok(self.store.read_all_counters().await?)
    }

    pub async fn ping(&self) -> Result<()> {
        Ok(self.store.ping().await?)
    }

    pub async fn close(&self) -> Result<()> {
        Ok(self.store.close().await?)
    }
}

enum Validated {
    Gauge(f64),
    Counter(i64),
}

fn validate(record: &MetricRecord) -> Result<Validated> {
    check_name(&record.id)?;
    match record.kind()? {
        MetricKind::Gauge => {
            let value = record
                .value
                .ok_or_else(|| missing(MetricKind::Gauge, &record.id, "value"))?;
            check_finite(value)?;
            Ok(Validated::Gauge(value))
        }
        MetricKind::Counter => record
            .delta
            .map(Validated::Counter)
            .ok_or_else(|| missing(MetricKind::Counter, &record.id, "delta")),
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ServiceError::EmptyName);
    }
    Ok(())
}

/// Gauges must be finite; JSON cannot carry NaN or infinities.
fn check_finite(value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(invalid(MetricKind::Gauge, &value.to_string()));
    }
    Ok(())
}

fn missing(kind: MetricKind, name: &str, field: &'static str) -> ServiceError {
    ServiceError::MissingValue {
        kind,
        name: name.to_string(),
        field,
    }
}

fn invalid(kind: MetricKind, raw: &str) -> ServiceError {
    ServiceError::InvalidValue {
        kind,
        raw: raw.to_string(),
    }
}
