use crate::Collector;
use anyhow::Result;
use gaugemon_common::types::MetricRecord;
use rand::Rng;
use sysinfo::{Pid, Process, ProcessesToUpdate, System};

type Accessor = fn(&Process) -> Option<f64>;

/// Process statistics reported as gauges, in emission order.
pub const PROCESS_GAUGES: &[(&str, Accessor)] = &[
    ("ResidentMemory", |p| Some(p.memory() as f64)),
    ("VirtualMemory", |p| Some(p.virtual_memory() as f64)),
    ("ProcessCpuUsage", |p| finite(p.cpu_usage() as f64)),
    ("DiskReadBytes", |p| Some(p.disk_usage().total_read_bytes as f64)),
    ("DiskWrittenBytes", |p| {
        Some(p.disk_usage().total_written_bytes as f64)
    }),
    ("RunTimeSeconds", |p| Some(p.run_time() as f64)),
];

pub const RANDOM_VALUE: &str = "RandomValue";

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Statistics of the agent's own process plus a uniform random gauge.
pub struct RuntimeCollector {
    system: System,
    pid: Option<Pid>,
}

impl RuntimeCollector {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                tracing::warn!(error = e, "Failed to resolve own pid, process stats disabled");
                None
            }
        };
        Self {
            system: System::new(),
            pid,
        }
    }

    fn process_gauges(&mut self) -> Vec<MetricRecord> {
        let Some(pid) = self.pid else {
            return Vec::new();
        };
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let Some(process) = self.system.process(pid) else {
            tracing::warn!(pid = %pid, "Own process not found, skipping process stats");
            return Vec::new();
        };

        let mut records = Vec::with_capacity(PROCESS_GAUGES.len());
        for (name, accessor) in PROCESS_GAUGES {
            match accessor(process) {
                Some(value) => records.push(MetricRecord::gauge(*name, value)),
                None => tracing::warn!(metric = name, "Field unavailable, skipping"),
            }
        }
        records
    }
}

impl Default for RuntimeCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for RuntimeCollector {
    fn name(&self) -> &str {
        "runtime"
    }

    fn collect(&mut self) -> Result<Vec<MetricRecord>> {
        let mut records = self.process_gauges();
        let random: f64 = rand::thread_rng().gen();
        records.push(MetricRecord::gauge(RANDOM_VALUE, random));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaugemon_common::types::MetricKind;

    #[test]
    fn test_collect_reports_table_and_random_value() {
        let mut collector = RuntimeCollector::new();
        let records = collector.collect().unwrap();

        let names: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(names.last(), Some(&RANDOM_VALUE));
        for (name, _) in PROCESS_GAUGES {
            assert!(names.contains(name), "missing {name}");
        }
        assert!(records
            .iter()
            .all(|r| r.kind() == Ok(MetricKind::Gauge) && r.value.is_some()));
    }

    #[test]
    fn test_random_value_in_unit_interval() {
        let mut collector = RuntimeCollector::new();
        for _ in 0..20 {
            let records = collector.collect().unwrap();
            let random = records
                .iter()
                .find(|r| r.id == RANDOM_VALUE)
                .and_then(|r| r.value)
                .unwrap();
            assert!((0.0..1.0).contains(&random));
        }
    }

    #[test]
    fn test_table_names_are_unique() {
        let mut names: Vec<&str> = PROCESS_GAUGES.iter().map(|(n, _)| *n).collect();
        names.push(RANDOM_VALUE);
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(before, names.len());
    }
}
