//! Metric collection for the gaugemon agent.
//!
//! Each [`Collector`] gathers one independent source of metrics (the agent's
//! own process, the host) and returns them as wire-ready
//! [`MetricRecord`]s. The agent runs all collectors concurrently on every
//! poll tick and joins their output into a single snapshot.

pub mod host;
pub mod runtime;

use anyhow::Result;
use gaugemon_common::types::MetricRecord;

pub use host::HostCollector;
pub use runtime::RuntimeCollector;

/// A metric source polled by the agent.
///
/// `collect` is called from a blocking thread on every poll tick. Collectors
/// keep their `sysinfo` handle between calls so that rate-based readings
/// (CPU usage) have a previous sample to diff against.
pub trait Collector: Send + Sync {
    /// Collector name (e.g. `"runtime"`, `"host"`), used for logging.
    fn name(&self) -> &str;

    /// Collects current metric values.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be read at all. Individual
    /// unreadable fields are skipped with a warning instead.
    fn collect(&mut self) -> Result<Vec<MetricRecord>>;
}

/// The standard collector set: one runtime source and one host source.
pub fn default_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(RuntimeCollector::new()),
        Box::new(HostCollector::new()),
    ]
}
