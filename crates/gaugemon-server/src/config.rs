use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address. A bare `:port` listens on all interfaces.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,
    /// Replay the backup file into the store before accepting requests.
    #[serde(default)]
    pub restore: bool,
    /// Database URL; unset selects the in-memory store.
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// HMAC key for request verification and response signing.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_file_storage_path() -> String {
    "./metrics.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: false,
            database_dsn: None,
            key: None,
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with(path, |name| std::env::var(name).ok())
    }

    /// Reads `path` (defaults if absent), applies overrides from `lookup`
    /// and validates.
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

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = lookup("STORE_INTERVAL") {
            self.store_interval_secs = parse_env("STORE_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("FILE_STORAGE_PATH") {
            self.file_storage_path = v;
        }
        if let Some(v) = lookup("RESTORE") {
            self.restore = parse_env("RESTORE", &v)?;
        }
        if let Some(v) = lookup("DATABASE_DSN") {
            self.database_dsn = Some(v);
        }
        if let Some(v) = lookup("KEY") {
            self.key = Some(v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if self.database_dsn.as_deref().is_some_and(|d| d.trim().is_empty()) {
            self.database_dsn = None;
        }
        if self.key.as_deref().is_some_and(str::is_empty) {
            self.key = None;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_interval_secs == 0 {
            bail!("store_interval_secs must be greater than 0");
        }
        if self.file_storage_path.trim().is_empty() {
            bail!("file_storage_path must not be empty");
        }
        Ok(())
    }

    /// `address` with a bare `:port` expanded to all interfaces.
    pub fn listen_addr(&self) -> String {
        let addr = self.address.trim();
        if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.to_string()
        }
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    /// Filter directive used when `RUST_LOG` is not set.
    pub fn log_directive(&self) -> String {
        format!("gaugemon={}", self.log_level.trim())
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
