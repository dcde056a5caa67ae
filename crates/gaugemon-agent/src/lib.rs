//! The gaugemon agent: polls local metrics into a snapshot, periodically
//! queues the snapshot for delivery, and a fixed pool of workers ships each
//! batch to the server over gzipped, optionally signed HTTP.

pub mod agent;
pub mod config;
pub mod snapshot;
pub mod transport;

pub use agent::{Agent, Schedule};
pub use config::AgentConfig;
pub use transport::{Transport, TransportError};
