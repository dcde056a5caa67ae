use serde::{Deserialize, Serialize};

/// The two metric namespaces. A gauge and a counter may share a name.
///
/// # Examples
///
/// ```
/// use gaugemon_common::types::MetricKind;
///
/// let kind: MetricKind = "counter".parse().unwrap();
/// assert_eq!(kind, MetricKind::Counter);
/// assert_eq!(kind.to_string(), "counter");
/// assert!("histogram".parse::<MetricKind>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type tag outside `{gauge, counter}`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown metric type '{0}', allowed metric types: gauge, counter")]
pub struct UnknownKind(pub String);

impl std::str::FromStr for MetricKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// JSON wire record: `{"id", "type", "value"?, "delta"?}`.
///
/// The type tag is kept as a raw string so that an unknown tag reaches the
/// service layer and is rejected there as a validation error instead of
/// failing deserialization of the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub mtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl MetricRecord {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricKind::Gauge.to_string(),
            value: Some(value),
            delta: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricKind::Counter.to_string(),
            value: None,
            delta: Some(delta),
        }
    }

    /// Parses the type tag.
    pub fn kind(&self) -> Result<MetricKind, UnknownKind> {
        self.mtype.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaugeMetric {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterMetric {
    pub name: String,
    pub value: i64,
}

/// Full dump of a store, persisted as a single JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupImage {
    #[serde(default)]
    pub gauges: Vec<GaugeMetric>,
    #[serde(default)]
    pub counters: Vec<CounterMetric>,
}

impl BackupImage {
    pub fn is_empty(&self) -> bool {
        self.gauges.is_empty() && self.counters.is_empty()
    }
}
