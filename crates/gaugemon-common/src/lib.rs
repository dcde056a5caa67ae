//! Types and primitives shared by the gaugemon agent and server.
//!
//! The wire record ([`types::MetricRecord`]) is what travels over HTTP; the
//! typed [`types::GaugeMetric`] / [`types::CounterMetric`] pair is what the
//! server hands to its store and writes into backup images.

pub mod hasher;
pub mod retry;
pub mod shutdown;
pub mod types;
