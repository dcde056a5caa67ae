use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// `host:port` of the gaugemon server.
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// HMAC signing key. Unset or empty disables signing.
    #[serde(default)]
    pub key: Option<String>,
}

fn default_server_addr() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_addr: default_server_addr(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            rate_limit: default_rate_limit(),
            key: None,
        }
    }
}

impl AgentConfig {
    /// Reads `path` (defaults if the file is absent), then applies
    /// environment overrides and validates the result.
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    pub fn load_with(path: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {path}"))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {path}"))?
        } else {
            Self::default()
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `ADDRESS`, `POLL_INTERVAL`, `REPORT_INTERVAL`, `RATE_LIMIT`
    /// and `KEY` as returned by `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = lookup("ADDRESS") {
            self.server_addr = addr;
        }
        if let Some(v) = lookup("POLL_INTERVAL") {
            self.poll_interval_secs = parse_env("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("REPORT_INTERVAL") {
            self.report_interval_secs = parse_env("REPORT_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("RATE_LIMIT") {
            self.rate_limit = parse_env("RATE_LIMIT", &v)?;
        }
        if let Some(key) = lookup("KEY") {
            self.key = Some(key);
        }
        if self.key.as_deref().is_some_and(str::is_empty) {
            self.key = None;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_addr.trim().is_empty() {
            bail!("server_addr must not be empty");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll_interval_secs must be greater than 0");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be greater than 0");
        }
        if self.rate_limit == 0 {
            bail!("rate_limit must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid value for {name} ({value:?}): {e}"))
}
