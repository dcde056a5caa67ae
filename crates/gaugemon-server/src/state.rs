use crate::service::MetricService;
use gaugemon_common::hasher::Hasher;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MetricService>,
    /// Set when a signing key is configured.
    pub hasher: Option<Arc<Hasher>>,
}

impl AppState {
    pub fn new(service: Arc<MetricService>, key: Option<&str>) -> anyhow::Result<Self> {
        let hasher = key.map(Hasher::new).transpose()?.map(Arc::new);
        Ok(Self { service, hasher })
    }
}
