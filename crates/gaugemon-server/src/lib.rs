//! Metrics collection server: accepts gauge and counter updates over HTTP,
//! keeps the latest value of each in a [`gaugemon_storage::MetricStore`] and
//! snapshots them to a JSON backup file.

pub mod api;
pub mod app;
pub mod backup;
pub mod config;
pub mod logging;
pub mod middleware;
pub mod server;
pub mod service;
pub mod state;
