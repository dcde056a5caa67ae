use crate::error::{Result, StorageError};
use crate::MetricStore;
use async_trait::async_trait;
use gaugemon_common::types::{CounterMetric, GaugeMetric, MetricKind};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Process-local store with one lock per namespace, so gauge and counter
/// traffic never contend.
#[derive(Debug, Default)]
pub struct MemStore {
    gauges: RwLock<HashMap<String, f64>>,
    counters: RwLock<HashMap<String, i64>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetricStore for MemStore {
    async fn write_gauge(&self, name: &str, value: f64) -> Result<()> {
        write(&self.gauges).insert(name.to_string(), value);
        Ok(())
    }

    async fn write_counter(&self, name: &str, delta: i64) -> Result<()> {
        let mut counters = write(&self.counters);
        let total = counters.entry(name.to_string()).or_insert(0);
        *total = total.wrapping_add(delta);
        Ok(())
    }

    async fn read_gauge(&self, name: &str) -> Result<f64> {
        read(&self.gauges)
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Gauge, name))
    }

    async fn read_counter(&self, name: &str) -> Result<i64> {
        read(&self.counters)
            .get(name)
            .copied()
            .ok_or_else(|| StorageError::not_found(MetricKind::Counter, name))
    }

    async fn read_all_gauges(&self) -> Result<Vec<GaugeMetric>> {
        let mut all: Vec<GaugeMetric> = read(&self.gauges)
            .iter()
            .map(|(name, value)| GaugeMetric {
                name: name.clone(),
                value: *value,
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn read_all_counters(&self) -> Result<Vec<CounterMetric>> {
        let mut all: Vec<CounterMetric> = read(&self.counters)
            .iter()
            .map(|(name, value)| CounterMetric {
                name: name.clone(),
                value: *value,
            })
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn write_batch(&self, gauges: &[GaugeMetric], counters: &[CounterMetric]) -> Result<()> {
        if !gauges.is_empty() {
            let mut map = write(&self.gauges);
            for g in gauges {
                map.insert(g.name.clone(), g.value);
            }
        }
        if !counters.is_empty() {
            let mut map = write(&self.counters);
            for c in counters {
                let total = map.entry(c.name.clone()).or_insert(0);
                *total = total.wrapping_add(c.value);
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
