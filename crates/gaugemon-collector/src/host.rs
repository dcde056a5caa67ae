use crate::Collector;
use anyhow::Result;
use gaugemon_common::types::MetricRecord;
use sysinfo::System;

pub const TOTAL_MEMORY: &str = "TotalMemory";
pub const FREE_MEMORY: &str = "FreeMemory";
pub const CPU_UTILIZATION: &str = "CPUutilization1";

/// Host-wide memory and CPU gauges.
pub struct HostCollector {
    system: System,
}

impl HostCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the CPU sample so the first collect has something to diff against.
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for HostCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for HostCollector {
    fn name(&self) -> &str {
        "host"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        self.system.refresh_memory();
        let mut records = vec![
            MetricRecord::gauge(TOTAL_MEMORY, self.system.total_memory() as f64),
            MetricRecord::gauge(FREE_MEMORY, self.system.free_memory() as f64),
        ];

        self.system.refresh_cpu_all();
        let usage = self.system.global_cpu_usage() as f64;
        if usage.is_finite() {
            records.push(MetricRecord::gauge(CPU_UTILIZATION, usage));
        } else {
            tracing::warn!(metric = CPU_UTILIZATION, "CPU usage unavailable, skipping");
        }

        Ok(records)
    }
}
